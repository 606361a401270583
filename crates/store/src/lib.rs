//! Collaborator adapters for Switchboard.
//!
//! - [`InMemoryStore`]: presence, conversations and call sessions in memory
//! - [`SqliteStore`]: conversations and call sessions in SQLite (feature `sqlite`)
//! - [`ConfigCatalog`]: channels and scripts from the configuration file

pub mod catalog;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use catalog::{ConfigCatalog, all_pool_ids};
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use chrono::TimeDelta;
use std::sync::Arc;
use tracing::info;

use switchboard_config::{AppConfig, MAX_WINDOW_SECS};
use switchboard_core::{CallRegistry, ConversationStore, Error, Result};
#[cfg(feature = "sqlite")]
use switchboard_core::{Upstream, UpstreamError};

/// The adapters selected by a configuration.
pub struct Backends {
    pub catalog: Arc<ConfigCatalog>,
    /// Presence is always served from memory, seeded from `[presence]`
    pub presence: Arc<InMemoryStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub calls: Arc<dyn CallRegistry>,
    /// Name of the conversation/call backend ("memory" or "sqlite")
    pub kind: &'static str,
}

/// Build the adapters described by `config`.
pub async fn build_from_config(config: &AppConfig) -> Result<Backends> {
    let catalog = Arc::new(ConfigCatalog::from_config(config)?);

    let secs = config.routing.call_stale_after_secs;
    let stale_after = i64::try_from(secs)
        .ok()
        .filter(|_| secs <= MAX_WINDOW_SECS)
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| Error::Config {
            message: "routing.call_stale_after_secs is out of range".into(),
        })?;

    let memory = Arc::new(InMemoryStore::new().with_stale_after(stale_after));
    for agent in &config.presence.online {
        memory.set_online(agent.as_str(), true).await;
    }

    let backends = match config.store.backend.as_str() {
        "memory" => Backends {
            catalog,
            presence: memory.clone(),
            conversations: memory.clone(),
            calls: memory,
            kind: "memory",
        },
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.store.database_path();
            let file = std::path::Path::new(path.trim_start_matches("sqlite://"));
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    UpstreamError::unavailable(
                        Upstream::Conversations,
                        format!("cannot create {}: {e}", parent.display()),
                    )
                })?;
            }
            let sqlite = Arc::new(SqliteStore::new(&path).await?.with_stale_after(stale_after));
            Backends {
                catalog,
                presence: memory,
                conversations: sqlite.clone(),
                calls: sqlite,
                kind: "sqlite",
            }
        }
        other => {
            return Err(Error::Config {
                message: format!("store backend '{other}' is not available in this build"),
            });
        }
    };

    info!(
        backend = backends.kind,
        channels = backends.catalog.channel_ids().len(),
        online = config.presence.online.len(),
        "Store backends ready"
    );
    Ok(backends)
}
