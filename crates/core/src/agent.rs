//! Human operators eligible to take chats.

use crate::ids::{AgentId, CountryCode, LangCode};
use serde::{Deserialize, Serialize};

/// A human operator. Read-only to routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,

    /// Internal name
    pub name: String,

    /// Public-facing name shown to visitors (falls back to `name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_alias: Option<String>,

    /// Primary languages
    #[serde(default)]
    pub languages: Vec<LangCode>,

    /// Additional languages the agent can handle
    #[serde(default)]
    pub extra_languages: Vec<LangCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<CountryCode>,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chat_alias: None,
            languages: Vec::new(),
            extra_languages: Vec::new(),
            country: None,
        }
    }

    pub fn with_languages<I, L>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LangCode>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_languages<I, L>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LangCode>,
    {
        self.extra_languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_country(mut self, country: impl Into<CountryCode>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_chat_alias(mut self, alias: impl Into<String>) -> Self {
        self.chat_alias = Some(alias.into());
        self
    }

    /// The name visitors see.
    pub fn display_name(&self) -> &str {
        self.chat_alias.as_deref().unwrap_or(&self.name)
    }

    pub fn speaks(&self, lang: &LangCode) -> bool {
        self.languages.contains(lang)
    }

    pub fn speaks_additionally(&self, lang: &LangCode) -> bool {
        self.extra_languages.contains(lang)
    }
}
