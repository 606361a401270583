//! Rule matching: bot-vs-human routing and widget display behavior.
//!
//! Rules are evaluated in two tiers: rules scoped to the visitor's country
//! first, then country-agnostic rules. Within a tier, ascending `sequence`
//! with definition order breaking ties. The first rule whose predicates all
//! pass wins. Rules scoped to other countries are never evaluated.
//!
//! A malformed rule (bad regex, unknown script) is logged and skipped.
//! Collaborator failures abort the match.

use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use switchboard_core::{Channel, CountryCode, Rule, RuleError, ScriptEngine, UpstreamError};

use crate::availability::OnlineLookup;

/// Outcome of evaluating one rule.
enum Verdict {
    Match,
    Miss(&'static str),
    Invalid(RuleError),
}

pub struct RuleMatcher {
    scripts: Arc<dyn ScriptEngine>,
    patterns: PatternCache,
}

impl RuleMatcher {
    pub fn new(scripts: Arc<dyn ScriptEngine>) -> Self {
        Self {
            scripts,
            patterns: PatternCache::default(),
        }
    }

    /// First rule of `channel` matching the visitor context, if any.
    ///
    /// Presence is only read (through `lookup`) when a rule reaches its
    /// `require_no_operator` predicate.
    pub async fn match_rule(
        &self,
        channel: &Channel,
        url: Option<&str>,
        country: Option<&CountryCode>,
        lookup: &OnlineLookup<'_>,
    ) -> Result<Option<Rule>, UpstreamError> {
        let url = url.filter(|u| !u.is_empty());

        for (tier, rules) in evaluation_order(&channel.rules, country) {
            for rule in rules {
                match self.evaluate(rule, url, lookup).await? {
                    Verdict::Match => {
                        debug!(channel = %channel.id, tier, sequence = rule.sequence, "Rule matched");
                        return Ok(Some(rule.clone()));
                    }
                    Verdict::Miss(predicate) => {
                        debug!(channel = %channel.id, tier, sequence = rule.sequence, predicate, "Rule skipped");
                    }
                    Verdict::Invalid(err) => {
                        warn!(channel = %channel.id, error = %err, "Ignoring invalid rule");
                    }
                }
            }
        }

        Ok(None)
    }

    async fn evaluate(
        &self,
        rule: &Rule,
        url: Option<&str>,
        lookup: &OnlineLookup<'_>,
    ) -> Result<Verdict, UpstreamError> {
        match self.patterns.url_matches(rule, url) {
            Ok(true) => {}
            Ok(false) => return Ok(Verdict::Miss("url")),
            Err(err) => return Ok(Verdict::Invalid(err)),
        }

        if let Some(script_id) = &rule.script {
            match self.scripts.script(script_id).await? {
                None => {
                    return Ok(Verdict::Invalid(RuleError::DanglingScript {
                        sequence: rule.sequence,
                        script: script_id.clone(),
                    }));
                }
                Some(script) if !script.is_usable() => return Ok(Verdict::Miss("script")),
                Some(_) => {}
            }
        }

        if rule.require_no_operator && !lookup.agents().await?.is_empty() {
            return Ok(Verdict::Miss("operators_online"));
        }

        Ok(Verdict::Match)
    }
}

/// The tiers to evaluate, each sorted by sequence (stable).
fn evaluation_order<'a>(
    rules: &'a [Rule],
    country: Option<&CountryCode>,
) -> Vec<(&'static str, Vec<&'a Rule>)> {
    let mut tiers = Vec::with_capacity(2);

    if let Some(country) = country {
        let mut scoped: Vec<&Rule> = rules.iter().filter(|r| r.targets_country(country)).collect();
        scoped.sort_by_key(|r| r.sequence);
        tiers.push(("country", scoped));
    }

    let mut agnostic: Vec<&Rule> = rules.iter().filter(|r| !r.is_country_specific()).collect();
    agnostic.sort_by_key(|r| r.sequence);
    tiers.push(("any_country", agnostic));

    tiers
}

/// Compiled URL patterns keyed by their source text.
///
/// Patterns that fail to compile are not cached and fail again on every
/// evaluation.
#[derive(Default)]
struct PatternCache {
    compiled: RwLock<HashMap<String, Regex>>,
}

impl PatternCache {
    fn url_matches(&self, rule: &Rule, url: Option<&str>) -> Result<bool, RuleError> {
        let Some(pattern) = url_pattern(rule) else {
            return Ok(url.is_none_or(str::is_empty));
        };

        let cached = self
            .compiled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(pattern)
            .cloned();
        let regex = match cached {
            Some(regex) => regex,
            None => {
                let regex = compile(rule, pattern)?;
                self.compiled
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(pattern.to_string(), regex.clone());
                regex
            }
        };
        Ok(regex.is_match(url.unwrap_or("")))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.compiled.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn url_pattern(rule: &Rule) -> Option<&str> {
    rule.url_pattern
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

fn compile(rule: &Rule, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
        sequence: rule.sequence,
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Whether `rule`'s URL pattern accepts `url`.
///
/// A rule without a pattern only matches visitors without a URL. A pattern
/// is searched anywhere in the URL (the empty string when there is none).
pub fn url_matches(rule: &Rule, url: Option<&str>) -> Result<bool, RuleError> {
    let Some(pattern) = url_pattern(rule) else {
        return Ok(url.is_none_or(str::is_empty));
    };
    Ok(compile(rule, pattern)?.is_match(url.unwrap_or("")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityDirectory;
    use crate::test_helpers::{FakePresence, FakeScripts, agent, script};

    fn matcher() -> RuleMatcher {
        RuleMatcher::new(Arc::new(FakeScripts::with(vec![
            script("bot", true, &["hello"]),
            script("draft", false, &["hello"]),
            script("empty", true, &[]),
        ])))
    }

    fn channel(rules: Vec<Rule>) -> Channel {
        Channel::new("web", "Website")
            .with_pool(vec![agent("alice")])
            .with_rules(rules)
    }

    async fn run(
        matcher: &RuleMatcher,
        channel: &Channel,
        presence: FakePresence,
        url: Option<&str>,
        country: Option<&str>,
    ) -> Result<Option<Rule>, UpstreamError> {
        let directory = AvailabilityDirectory::new(Arc::new(presence));
        let lookup = directory.lookup(channel);
        let country = country.map(CountryCode::from);
        matcher.match_rule(channel, url, country.as_ref(), &lookup).await
    }

    async fn matched_sequence(channel: &Channel, url: Option<&str>, country: Option<&str>) -> Option<i32> {
        run(&matcher(), channel, FakePresence::nobody(), url, country)
            .await
            .unwrap()
            .map(|r| r.sequence)
    }

    #[tokio::test]
    async fn country_tier_wins_over_lower_sequence_agnostic_rule() {
        let channel = channel(vec![
            Rule::new(1).with_url_pattern("/shop"),
            Rule::new(50).with_url_pattern("/shop").with_countries(["be"]),
        ]);
        assert_eq!(matched_sequence(&channel, Some("https://x.io/shop"), Some("be")).await, Some(50));
        assert_eq!(matched_sequence(&channel, Some("https://x.io/shop"), Some("fr")).await, Some(1));
        assert_eq!(matched_sequence(&channel, Some("https://x.io/shop"), None).await, Some(1));
    }

    #[tokio::test]
    async fn only_the_matching_country_rule_is_returned() {
        let channel = channel(vec![
            Rule::new(5).with_url_pattern("/pricing").with_countries(["de"]),
            Rule::new(9).with_url_pattern("/contact").with_countries(["de"]),
        ]);
        let found = matched_sequence(&channel, Some("https://x.io/contact"), Some("de")).await;
        assert_eq!(found, Some(9));
    }

    #[tokio::test]
    async fn smallest_sequence_wins_within_a_tier() {
        let channel = channel(vec![
            Rule::new(30).with_url_pattern("x"),
            Rule::new(10).with_url_pattern("x"),
            Rule::new(20).with_url_pattern("x"),
        ]);
        assert_eq!(matched_sequence(&channel, Some("x"), None).await, Some(10));
    }

    #[tokio::test]
    async fn sequence_ties_keep_definition_order() {
        let channel = channel(vec![
            Rule::new(10).with_url_pattern("x").with_action(switchboard_core::WidgetAction::AutoPopup),
            Rule::new(10).with_url_pattern("x"),
        ]);
        for _ in 0..20 {
            let rule = run(&matcher(), &channel, FakePresence::nobody(), Some("x"), None)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(rule.action, switchboard_core::WidgetAction::AutoPopup);
        }
    }

    #[tokio::test]
    async fn other_countries_rules_are_never_returned() {
        let channel = channel(vec![Rule::new(1).with_countries(["jp"])]);
        assert_eq!(matched_sequence(&channel, None, Some("be")).await, None);
        assert_eq!(matched_sequence(&channel, None, None).await, None);
    }

    #[tokio::test]
    async fn empty_pattern_matches_only_without_url() {
        let channel = channel(vec![Rule::new(1)]);
        assert_eq!(matched_sequence(&channel, None, None).await, Some(1));
        assert_eq!(matched_sequence(&channel, Some(""), None).await, Some(1));
        assert_eq!(matched_sequence(&channel, Some("https://x.io/"), None).await, None);

        let blank = channel_with_blank_pattern();
        assert_eq!(matched_sequence(&blank, Some("https://x.io/"), None).await, None);
    }

    fn channel_with_blank_pattern() -> Channel {
        channel(vec![Rule::new(1).with_url_pattern("   ")])
    }

    #[tokio::test]
    async fn invalid_regex_is_skipped_not_fatal() {
        let channel = channel(vec![
            Rule::new(1).with_url_pattern("(unclosed"),
            Rule::new(2).with_url_pattern("/help"),
        ]);
        assert_eq!(matched_sequence(&channel, Some("/help"), None).await, Some(2));
    }

    #[tokio::test]
    async fn dangling_script_is_skipped_not_fatal() {
        let channel = channel(vec![
            Rule::new(1).with_script("deleted"),
            Rule::new(2).with_script("bot"),
        ]);
        let rule = run(&matcher(), &channel, FakePresence::nobody(), None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.script.as_ref().map(|s| s.as_str()), Some("bot"));
    }

    #[tokio::test]
    async fn unusable_scripts_do_not_match() {
        let channel = channel(vec![
            Rule::new(1).with_script("draft"),
            Rule::new(2).with_script("empty"),
        ]);
        assert_eq!(matched_sequence(&channel, None, None).await, None);
    }

    #[tokio::test]
    async fn require_no_operator_consults_presence() {
        let channel = channel(vec![Rule::new(1).with_script("bot").only_if_no_operator()]);
        let m = matcher();

        let nobody = run(&m, &channel, FakePresence::nobody(), None, None).await.unwrap();
        assert!(nobody.is_some());

        let staffed = run(&m, &channel, FakePresence::online(["alice"]), None, None)
            .await
            .unwrap();
        assert!(staffed.is_none());
    }

    #[tokio::test]
    async fn presence_not_read_when_url_fails_first() {
        let channel = channel(vec![Rule::new(1).with_url_pattern("/only-here").only_if_no_operator()]);
        let presence = Arc::new(FakePresence::unreachable());
        let directory = AvailabilityDirectory::new(presence.clone());
        let lookup = directory.lookup(&channel);
        let found = matcher()
            .match_rule(&channel, Some("/elsewhere"), None, &lookup)
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(presence.calls(), 0);
    }

    #[tokio::test]
    async fn unreachable_presence_propagates() {
        let channel = channel(vec![Rule::new(1).only_if_no_operator()]);
        let result = run(&matcher(), &channel, FakePresence::unreachable(), None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_script_engine_propagates() {
        let channel = channel(vec![Rule::new(1).with_script("bot")]);
        let matcher = RuleMatcher::new(Arc::new(FakeScripts::unreachable()));
        let result = run(&matcher, &channel, FakePresence::nobody(), None, None).await;
        assert!(result.is_err());
    }

    #[test]
    fn pattern_is_a_search_not_a_full_match() {
        let rule = Rule::new(1).with_url_pattern("pricing");
        assert!(url_matches(&rule, Some("https://x.io/en/pricing?plan=pro")).unwrap());
        assert!(!url_matches(&rule, None).unwrap());
        assert!(matches!(
            url_matches(&Rule::new(3).with_url_pattern("[a-"), Some("x")),
            Err(RuleError::InvalidPattern { sequence: 3, .. })
        ));
    }

    #[tokio::test]
    async fn patterns_compile_once_per_matcher() {
        let channel = channel(vec![
            Rule::new(1).with_url_pattern("/checkout"),
            Rule::new(2).with_url_pattern("/help"),
            Rule::new(3).with_url_pattern("(unclosed"),
        ]);
        let m = matcher();
        for _ in 0..3 {
            let found = run(&m, &channel, FakePresence::nobody(), Some("/help/faq"), None)
                .await
                .unwrap();
            assert_eq!(found.map(|r| r.sequence), Some(2));
        }
        assert_eq!(m.patterns.len(), 2);
    }

    #[tokio::test]
    async fn visitor_country_case_does_not_matter() {
        let channel = channel(vec![
            Rule::new(1).with_url_pattern("/shop"),
            Rule::new(50).with_url_pattern("/shop").with_countries(["BE"]),
        ]);
        assert_eq!(matched_sequence(&channel, Some("/shop"), Some("be")).await, Some(50));
        assert_eq!(matched_sequence(&channel, Some("/shop"), Some(" Be ")).await, Some(50));
    }
}
