//! Script engine boundary: automated chat flows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::ids::{ScriptId, StepId};

/// What routing needs to know about a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub id: ScriptId,
    pub title: String,
    pub active: bool,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<StepId>,
}

impl ScriptInfo {
    /// Active and has something to say.
    pub fn is_usable(&self) -> bool {
        self.active && !self.steps.is_empty()
    }

    pub fn welcome_step(&self) -> Option<&StepId> {
        self.steps.first()
    }
}

#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Look up a script. `Ok(None)` means the reference is dangling.
    async fn script(&self, id: &ScriptId) -> Result<Option<ScriptInfo>, UpstreamError>;
}
