//! `switchboard reclaim`: Terminate stale call sessions once.
//!
//! Meant for cron when the gateway's periodic reclaim is disabled.

use switchboard_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (coordinator, backends) = switchboard_gateway::build_coordinator(&config).await?;

    let reclaimed = coordinator.reclaim_stale_call_sessions().await?;
    println!("  Reclaimed {reclaimed} stale call session(s) [{}]", backends.kind);

    Ok(())
}
