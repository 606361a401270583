//! Agent load: recent conversations and live calls, per candidate.
//!
//! [`LoadSnapshot::build`] is a pure function over two already-fetched
//! maps; [`LoadTracker`] does the fetching. Keeping them apart lets the
//! ranking rules be tested without any store.
//!
//! Ranking (best first):
//! 1. agents that can take more work: `recent_count < threshold || !in_call`
//! 2. fewer recent conversations
//! 3. not in a call

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info};

use switchboard_core::{AgentId, CallRegistry, ConversationStore, RecentWindow, UpstreamError};

/// Recent activity of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentLoad {
    pub recent_count: u32,
    pub in_call: bool,
}

impl AgentLoad {
    pub fn new(recent_count: u32, in_call: bool) -> Self {
        Self {
            recent_count,
            in_call,
        }
    }

    /// Not saturated: few enough chats, or at least not on the phone.
    pub fn has_capacity(&self, threshold: u32) -> bool {
        self.recent_count < threshold || !self.in_call
    }

    /// Ascending sort key: smaller is better.
    fn rank_key(&self, threshold: u32) -> (bool, u32, bool) {
        (!self.has_capacity(threshold), self.recent_count, self.in_call)
    }
}

/// Point-in-time load of a set of candidate agents.
///
/// Agents without any recent conversation and not in a call have no entry:
/// they are the most rested.
#[derive(Debug, Clone)]
pub struct LoadSnapshot {
    entries: HashMap<AgentId, AgentLoad>,
    ranked: Vec<AgentId>,
    threshold: u32,
}

impl LoadSnapshot {
    pub fn empty(threshold: u32) -> Self {
        Self {
            entries: HashMap::new(),
            ranked: Vec::new(),
            threshold,
        }
    }

    /// Combine per-agent counts and in-call flags for `candidates`.
    ///
    /// Entries outside `candidates` are ignored. Equal ranks keep candidate
    /// order.
    pub fn build(
        candidates: &[AgentId],
        counts: &HashMap<AgentId, u32>,
        in_call: &HashMap<AgentId, bool>,
        threshold: u32,
    ) -> Self {
        let mut entries = HashMap::new();
        let mut ranked = Vec::new();
        let mut seen = HashSet::new();

        for id in candidates {
            if !seen.insert(id) {
                continue;
            }
            let load = AgentLoad {
                recent_count: counts.get(id).copied().unwrap_or(0),
                in_call: in_call.get(id).copied().unwrap_or(false),
            };
            if load.recent_count > 0 || load.in_call {
                entries.insert(id.clone(), load);
                ranked.push(id.clone());
            }
        }

        ranked.sort_by_key(|id| entries[id].rank_key(threshold));

        Self {
            entries,
            ranked,
            threshold,
        }
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentLoad> {
        self.entries.get(id)
    }

    /// No recorded recent activity at all.
    pub fn is_rested(&self, id: &AgentId) -> bool {
        !self.entries.contains_key(id)
    }

    /// Agents with an entry, best first.
    pub fn ranked(&self) -> &[AgentId] {
        &self.ranked
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether a returning visitor may be given back to `id`.
    pub fn accepts_returning_visitor(&self, id: &AgentId) -> bool {
        self.get(id)
            .is_none_or(|load| load.has_capacity(self.threshold))
    }

    /// The best `(recent_count, in_call)` status among the entries of
    /// `subset`. `None` when no agent of the subset has an entry.
    pub fn best_status<'a>(&self, subset: impl IntoIterator<Item = &'a AgentId>) -> Option<AgentLoad> {
        subset
            .into_iter()
            .filter_map(|id| self.entries.get(id))
            .min_by_key(|load| load.rank_key(self.threshold))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Never reclaimed.
const NEVER: i64 = i64::MIN;

/// Builds [`LoadSnapshot`]s from the conversation store and call registry.
///
/// Holds no locks. Two concurrent routing decisions may read the same
/// snapshot state and pick the same agent; that transient over-assignment
/// is accepted.
pub struct LoadTracker {
    conversations: Arc<dyn ConversationStore>,
    calls: Arc<dyn CallRegistry>,
    window: RecentWindow,
    threshold: u32,
    reclaim_interval: TimeDelta,
    last_reclaim_ms: AtomicI64,
}

impl LoadTracker {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        calls: Arc<dyn CallRegistry>,
        window: RecentWindow,
        threshold: u32,
    ) -> Self {
        Self {
            conversations,
            calls,
            window,
            threshold,
            reclaim_interval: TimeDelta::zero(),
            last_reclaim_ms: AtomicI64::new(NEVER),
        }
    }

    /// Skip the pre-snapshot reclaim when one ran within `interval`.
    pub fn with_reclaim_interval(mut self, interval: TimeDelta) -> Self {
        self.reclaim_interval = interval;
        self
    }

    pub fn window(&self) -> &RecentWindow {
        &self.window
    }

    pub async fn snapshot(&self, candidates: &[AgentId]) -> Result<LoadSnapshot, UpstreamError> {
        self.snapshot_at(candidates, Utc::now()).await
    }

    /// Snapshot as of `now`. Reclaims stale call sessions first unless a
    /// reclaim is known to be recent.
    pub async fn snapshot_at(
        &self,
        candidates: &[AgentId],
        now: DateTime<Utc>,
    ) -> Result<LoadSnapshot, UpstreamError> {
        if candidates.is_empty() {
            return Ok(LoadSnapshot::empty(self.threshold));
        }

        if self.reclaim_due(now) {
            self.reclaim_stale_call_sessions_at(now).await?;
        }

        let (counts, in_call) = futures::try_join!(
            self.conversations
                .count_active_recent(candidates, &self.window, now),
            self.calls.in_call(candidates),
        )?;

        let snapshot = LoadSnapshot::build(candidates, &counts, &in_call, self.threshold);
        debug!(
            candidates = candidates.len(),
            loaded = snapshot.len(),
            "Load snapshot built"
        );
        Ok(snapshot)
    }

    pub async fn reclaim_stale_call_sessions(&self) -> Result<usize, UpstreamError> {
        self.reclaim_stale_call_sessions_at(Utc::now()).await
    }

    /// Terminate stale call sessions. Safe to run concurrently and
    /// repeatedly.
    pub async fn reclaim_stale_call_sessions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, UpstreamError> {
        let reclaimed = self.calls.reclaim_stale(now).await?;
        self.last_reclaim_ms
            .fetch_max(now.timestamp_millis(), Ordering::Relaxed);
        if reclaimed > 0 {
            info!(reclaimed, "Reclaimed stale call sessions");
        }
        Ok(reclaimed)
    }

    fn reclaim_due(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_reclaim_ms.load(Ordering::Relaxed);
        last == NEVER || now.timestamp_millis() - last >= self.reclaim_interval.num_milliseconds()
    }
}
