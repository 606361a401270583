//! Channel rules: ordered, scoped predicates deciding bot-vs-human routing
//! and how the chat button behaves on a page.

use serde::{Deserialize, Serialize};

use crate::ids::{CountryCode, ScriptId};

/// What the embed layer should do with the chat button when a rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetAction {
    #[default]
    DisplayButton,
    DisplayButtonAndText,
    AutoPopup,
    HideButton,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Evaluation order within a tier (ascending)
    #[serde(default)]
    pub sequence: i32,

    /// Regex searched in the visitor URL. `None` matches only visitors
    /// without a URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,

    /// Countries this rule is restricted to. Empty = country-agnostic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<CountryCode>,

    /// Script to hand the visitor to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptId>,

    /// Only match while no agent of the channel is online
    #[serde(default)]
    pub require_no_operator: bool,

    #[serde(default)]
    pub action: WidgetAction,

    /// Delay before auto-popup opens the widget
    #[serde(default)]
    pub auto_popup_delay_secs: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
}

impl Rule {
    pub fn new(sequence: i32) -> Self {
        Self {
            sequence,
            url_pattern: None,
            countries: Vec::new(),
            script: None,
            require_no_operator: false,
            action: WidgetAction::default(),
            auto_popup_delay_secs: 0,
            button_text: None,
        }
    }

    pub fn with_url_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.url_pattern = Some(pattern.into());
        self
    }

    pub fn with_countries<I, C>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<CountryCode>,
    {
        self.countries = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_script(mut self, script: impl Into<ScriptId>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn only_if_no_operator(mut self) -> Self {
        self.require_no_operator = true;
        self
    }

    pub fn with_action(mut self, action: WidgetAction) -> Self {
        self.action = action;
        self
    }

    pub fn is_country_specific(&self) -> bool {
        !self.countries.is_empty()
    }

    pub fn targets_country(&self, country: &CountryCode) -> bool {
        self.countries.contains(country)
    }
}
