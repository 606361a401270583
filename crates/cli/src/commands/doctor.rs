//! `switchboard doctor`: diagnose configuration problems.

use switchboard_config::AppConfig;
use switchboard_core::{AgentId, ChannelCatalog, ScriptEngine};
use switchboard_routing::rules::url_matches;
use switchboard_store::{ConfigCatalog, all_pool_ids};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Switchboard Doctor: Configuration Diagnostics");
    println!("===============================================\n");

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ❌ No config file, run `switchboard onboard`");
        return Ok(());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config file valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            return Ok(());
        }
    };

    let backends = match switchboard_store::build_from_config(&config).await {
        Ok(backends) => {
            println!("  ✅ Store backend '{}' ready", backends.kind);
            backends
        }
        Err(e) => {
            println!("  ❌ Store backend unusable: {e}");
            return Ok(());
        }
    };

    let issues = check_catalog(&backends.catalog, &config).await?;

    println!();
    if issues.is_empty() {
        println!("  🎉 All checks passed!");
    } else {
        for issue in &issues {
            println!("  ⚠️  {issue}");
        }
        println!("\n  {} issue(s) found.", issues.len());
    }

    Ok(())
}

/// Problems that do not stop routing but make some rules or agents dead weight.
pub async fn check_catalog(
    catalog: &ConfigCatalog,
    config: &AppConfig,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut issues = Vec::new();
    let online: Vec<AgentId> = config
        .presence
        .online
        .iter()
        .map(|id| AgentId::from(id.as_str()))
        .collect();

    for id in catalog.channel_ids() {
        let Some(channel) = catalog.channel(&id).await? else {
            continue;
        };

        if channel.pool.is_empty() {
            issues.push(format!("channel '{id}' has no agents"));
        } else if !channel.pool_ids().iter().any(|a| online.contains(a)) {
            issues.push(format!("channel '{id}' has no agent listed as online"));
        }

        for rule in &channel.rules {
            if let Err(e) = url_matches(rule, None) {
                issues.push(format!("channel '{id}': {e}"));
            }
            let Some(script) = &rule.script else {
                continue;
            };
            match catalog.script(script).await? {
                None => issues.push(format!(
                    "channel '{id}' rule #{} names unknown script '{script}'",
                    rule.sequence
                )),
                Some(info) if !info.is_usable() => issues.push(format!(
                    "channel '{id}' rule #{} uses script '{script}', which is inactive or empty",
                    rule.sequence
                )),
                Some(_) => {}
            }
        }
    }

    let pooled = all_pool_ids(catalog);
    for agent in online.iter().filter(|a| !pooled.contains(a)) {
        issues.push(format!("online agent '{agent}' is in no channel pool"));
    }

    Ok(issues)
}
