//! `switchboard status`: configuration summary.

use switchboard_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let routing = &config.routing;

    println!("📞 Switchboard Status");
    println!("=====================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Store:        {}", config.store.backend);
    if config.store.backend == "sqlite" {
        println!("  Database:     {}", config.store.database_path());
    }
    println!(
        "  Recent load:  created < {}h, message < {}min",
        routing.recent_created_hours, routing.recent_message_minutes
    );
    println!("  Sticky limit: {} recent", routing.sticky_max_recent);
    println!("  Affinity:     {}", routing.affinity_order.join(" → "));
    println!("  Agents:       {} ({} online)", config.agents.len(), config.presence.online.len());
    println!("  Scripts:      {}", config.scripts.len());
    for channel in &config.channels {
        println!(
            "  Channel:      {} ({} agents, {} rules)",
            channel.id,
            channel.agents.len(),
            channel.rules.len()
        );
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file, run `switchboard onboard` first");
    }

    Ok(())
}
