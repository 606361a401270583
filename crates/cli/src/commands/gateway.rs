//! `switchboard gateway`: Start the HTTP routing API.

use switchboard_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("📞 Switchboard Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:      {}", config.store.backend);
    println!("   Channels:   {}", config.channels.len());
    if config.gateway.rate_limit_per_minute == 0 {
        println!("   Rate limit: off");
    } else {
        println!("   Rate limit: {}/min", config.gateway.rate_limit_per_minute);
    }

    switchboard_gateway::start(config).await?;

    Ok(())
}
