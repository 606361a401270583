//! Strongly typed identifiers.
//!
//! Every identity that crosses a collaborator boundary is a distinct newtype
//! over `String` so that an agent id can never be passed where a channel id
//! is expected.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// A routable live-chat endpoint.
    ChannelId
);
string_id!(
    /// A human operator identity.
    AgentId
);
string_id!(
    /// Language code (e.g. `fr_BE`).
    LangCode
);
string_id!(
    /// A scripted-bot flow.
    ScriptId
);
string_id!(
    /// A single step inside a script.
    StepId
);
string_id!(
    /// A website visitor (guest or logged-in user).
    VisitorId
);

/// ISO country code as reported by geo-IP (e.g. `BE`).
///
/// Stored trimmed and uppercase so `be` and `BE` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CountryCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CountryCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
