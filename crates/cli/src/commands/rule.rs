//! `switchboard rule`: Show the rule governing the widget on a page.

use switchboard_config::AppConfig;
use switchboard_core::{ChannelId, CountryCode};

pub async fn run(
    channel: String,
    url: Option<String>,
    country: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (coordinator, _) = switchboard_gateway::build_coordinator(&config).await?;

    let country = country.map(CountryCode::new);
    let rule = coordinator
        .match_rule(&ChannelId::new(channel), url.as_deref(), country.as_ref())
        .await?;

    match rule {
        Some(rule) => {
            println!("  Rule #{}", rule.sequence);
            println!("    Pattern:  {}", rule.url_pattern.as_deref().unwrap_or("(pages without URL)"));
            println!("    Action:   {:?}", rule.action);
            if let Some(script) = &rule.script {
                println!("    Script:   {script}");
            }
            if let Some(text) = &rule.button_text {
                println!("    Button:   {text}");
            }
            if rule.auto_popup_delay_secs > 0 {
                println!("    Popup in: {}s", rule.auto_popup_delay_secs);
            }
        }
        None => println!("  No rule matches, the widget uses its defaults"),
    }

    Ok(())
}
