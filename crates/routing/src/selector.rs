//! Operator selection: stickiness, affinity pipeline, least-active pick.
//!
//! The affinity fallback is an ordered list of [`AffinityStage`]s. Each
//! stage filters the online pool; the first stage with a non-empty subset
//! wins and the agent is the least active of that subset. Reordering or
//! dropping stages is a configuration change (`routing.affinity_order`).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use switchboard_config::AFFINITY_STAGES;
use switchboard_core::{Agent, AgentId, Error, RoutingRequest};

use crate::load::LoadSnapshot;
use crate::random::{RandomSource, ThreadRandom, choose};

/// One affinity filter over the online pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffinityStage {
    /// Primary languages contain the visitor's preferred language
    Language,
    /// Additional languages contain the visitor's preferred language
    ExtraLanguage,
    /// Same country as the visitor
    Country,
}

impl AffinityStage {
    pub fn name(&self) -> &'static str {
        match self {
            AffinityStage::Language => "language",
            AffinityStage::ExtraLanguage => "extra_language",
            AffinityStage::Country => "country",
        }
    }

    /// Agents of `pool` passing this stage's filter.
    ///
    /// `None` when the stage does not apply to the request (no preferred
    /// language, or no visitor country).
    pub fn candidates<'a>(&self, pool: &'a [Agent], req: &RoutingRequest) -> Option<Vec<&'a Agent>> {
        let selected = match self {
            AffinityStage::Language => {
                let lang = req.preferred_lang.as_ref()?;
                pool.iter().filter(|agent| agent.speaks(lang)).collect()
            }
            AffinityStage::ExtraLanguage => {
                let lang = req.preferred_lang.as_ref()?;
                pool.iter()
                    .filter(|agent| agent.speaks_additionally(lang))
                    .collect()
            }
            AffinityStage::Country => {
                let country = req.visitor_country.as_ref()?;
                pool.iter()
                    .filter(|agent| agent.country.as_ref() == Some(country))
                    .collect()
            }
        };
        Some(selected)
    }
}

impl fmt::Display for AffinityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AffinityStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "language" => Ok(AffinityStage::Language),
            "extra_language" => Ok(AffinityStage::ExtraLanguage),
            "country" => Ok(AffinityStage::Country),
            other => Err(Error::Config {
                message: format!(
                    "unknown affinity stage '{other}' (expected one of {})",
                    AFFINITY_STAGES.join(", ")
                ),
            }),
        }
    }
}

/// Ordered affinity stages, evaluated short-circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityPipeline {
    stages: Vec<AffinityStage>,
}

impl Default for AffinityPipeline {
    fn default() -> Self {
        Self::new(vec![
            AffinityStage::Language,
            AffinityStage::ExtraLanguage,
            AffinityStage::Country,
        ])
    }
}

impl AffinityPipeline {
    pub fn new(stages: Vec<AffinityStage>) -> Self {
        Self { stages }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, Error> {
        let stages = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(stages))
    }

    pub fn stages(&self) -> &[AffinityStage] {
        &self.stages
    }
}

/// Why an agent was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The visitor's previous agent took them back
    Sticky,
    /// First affinity stage with a non-empty subset
    Affinity(AffinityStage),
    /// Least active of the whole online pool
    LeastLoaded,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::Sticky => f.write_str("sticky"),
            SelectionReason::Affinity(stage) => write!(f, "affinity:{stage}"),
            SelectionReason::LeastLoaded => f.write_str("least_loaded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub agent: AgentId,
    pub reason: SelectionReason,
}

/// Picks one agent among the online pool.
pub struct OperatorSelector {
    pipeline: AffinityPipeline,
    random: Arc<dyn RandomSource>,
}

impl Default for OperatorSelector {
    fn default() -> Self {
        Self::new(AffinityPipeline::default())
    }
}

impl OperatorSelector {
    pub fn new(pipeline: AffinityPipeline) -> Self {
        Self {
            pipeline,
            random: Arc::new(ThreadRandom),
        }
    }

    /// Replace the tie-break source (tests, simulations).
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn pipeline(&self) -> &AffinityPipeline {
        &self.pipeline
    }

    /// The least active agent of `subset`.
    ///
    /// Rested agents (no snapshot entry) always win, chosen uniformly.
    /// Otherwise the tie group sharing the best `(recent_count, in_call)`
    /// status is located and one of them is chosen uniformly.
    pub fn least_active_of<'a>(&self, subset: &[&'a Agent], snapshot: &LoadSnapshot) -> Option<&'a Agent> {
        let rested: Vec<&Agent> = subset
            .iter()
            .copied()
            .filter(|agent| snapshot.is_rested(&agent.id))
            .collect();
        if !rested.is_empty() {
            return choose(self.random.as_ref(), &rested).copied();
        }

        let best = snapshot.best_status(subset.iter().map(|agent| &agent.id))?;
        let tie_group: Vec<&Agent> = subset
            .iter()
            .copied()
            .filter(|agent| snapshot.get(&agent.id) == Some(&best))
            .collect();
        choose(self.random.as_ref(), &tie_group).copied()
    }

    /// Least active agent of the whole `pool`, ignoring affinity.
    pub fn select(&self, pool: &[Agent], snapshot: &LoadSnapshot) -> Option<AgentId> {
        let subset: Vec<&Agent> = pool.iter().collect();
        self.least_active_of(&subset, snapshot)
            .map(|agent| agent.id.clone())
    }

    /// Choose an agent for `req` among `online`. `None` only when `online`
    /// is empty.
    pub fn pick_operator(
        &self,
        req: &RoutingRequest,
        online: &[Agent],
        snapshot: &LoadSnapshot,
    ) -> Option<Selection> {
        if online.is_empty() {
            return None;
        }

        if let Some(previous) = &req.previous_agent {
            let is_online = online.iter().any(|agent| &agent.id == previous);
            if is_online && snapshot.accepts_returning_visitor(previous) {
                return Some(Selection {
                    agent: previous.clone(),
                    reason: SelectionReason::Sticky,
                });
            }
            debug!(agent = %previous, online = is_online, "Previous agent not eligible");
        }

        for stage in self.pipeline.stages() {
            let Some(candidates) = stage.candidates(online, req) else {
                continue;
            };
            debug!(stage = %stage, candidates = candidates.len(), "Affinity stage evaluated");
            if let Some(agent) = self.least_active_of(&candidates, snapshot) {
                return Some(Selection {
                    agent: agent.id.clone(),
                    reason: SelectionReason::Affinity(*stage),
                });
            }
        }

        self.select(online, snapshot).map(|agent| Selection {
            agent,
            reason: SelectionReason::LeastLoaded,
        })
    }
}
