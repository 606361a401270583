//! `switchboard route`: Decide where one visitor's chat would go.

use switchboard_config::AppConfig;
use switchboard_gateway::api_v1::VisitorContext;

pub async fn run(
    channel: String,
    visitor: VisitorContext,
    with_session: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let (coordinator, _) = switchboard_gateway::build_coordinator(&config).await?;
    let req = visitor.into_request(channel);

    if with_session {
        let session = coordinator.start_session(&req).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&session)?);
        } else {
            println!("  Destination: {}", session.destination);
            println!("  Session:     {} ({})", session.name, session.id);
            for member in &session.members {
                let pinned = if member.is_pinned() { "pinned" } else { "unpinned" };
                println!("    - {:?} [{pinned}]", member.identity);
            }
        }
        return Ok(());
    }

    let destination = coordinator.route(&req).await?;
    if json {
        let out = serde_json::json!({
            "destination": destination,
            "chat_enabled": destination.accepts_chat(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if destination.accepts_chat() {
        println!("  ✅ {destination}");
    } else {
        println!("  ⛔ Nobody can take this chat, the widget should stay hidden");
    }

    Ok(())
}
