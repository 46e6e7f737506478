//! Handle to every cross-worker structure of a run.
//!
//! Built once by the orchestrator before any worker starts and passed to
//! each worker by `Arc`. The agent set is fixed for the lifetime of the run.
//!
//! # Write ownership
//!
//! | Structure                      | Writers                         |
//! |--------------------------------|---------------------------------|
//! | `ExperienceReplay::append`     | any actor                       |
//! | `ExperienceReplay::trim`       | owning learner                  |
//! | `AgentStats` counters, weights | owning learner                  |
//! | `AgentStats::observe_reward`   | any actor (monotonic max)       |
//!
//! Ownership is fixed by [`SharedState::learner_for`], the round-robin
//! assignment of agent index `i` to learner `i % l`.

use crate::core::agent_stats::{AgentStats, SharedAgentStats};
use crate::core::barrier::{barrier, SharedBarrier};
use crate::core::experience_replay::{shared_replay, SharedReplay};
use crate::core::AgentId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Replay and stats of one agent.
#[derive(Clone)]
pub struct AgentShared {
    pub replay: SharedReplay,
    pub stats: SharedAgentStats,
}

/// Shared state of a run.
pub struct SharedState {
    agents: BTreeMap<AgentId, AgentShared>,
    order: Vec<AgentId>,
    barrier: SharedBarrier,
    n_learners: usize,
}

impl SharedState {
    /// Build replay and stats for every agent id.
    ///
    /// `agent_ids` order defines learner ownership.
    pub fn new(
        agent_ids: Vec<AgentId>,
        replay_capacity: usize,
        participants: usize,
        n_learners: usize,
    ) -> Self {
        let agents = agent_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    AgentShared {
                        replay: shared_replay(replay_capacity),
                        stats: Arc::new(AgentStats::new(id.clone())),
                    },
                )
            })
            .collect();

        Self {
            agents,
            order: agent_ids,
            barrier: barrier(participants),
            n_learners,
        }
    }

    pub fn barrier(&self) -> &SharedBarrier {
        &self.barrier
    }

    /// Agent ids in assignment order.
    pub fn agent_ids(&self) -> &[AgentId] {
        &self.order
    }

    pub fn agent(&self, id: &AgentId) -> Option<&AgentShared> {
        self.agents.get(id)
    }

    pub fn replay(&self, id: &AgentId) -> Option<&SharedReplay> {
        self.agents.get(id).map(|a| &a.replay)
    }

    pub fn stats(&self, id: &AgentId) -> Option<&SharedAgentStats> {
        self.agents.get(id).map(|a| &a.stats)
    }

    pub fn n_learners(&self) -> usize {
        self.n_learners
    }

    /// Learner owning `id`, or `None` when the run has no learners.
    pub fn learner_for(&self, id: &AgentId) -> Option<usize> {
        if self.n_learners == 0 {
            return None;
        }
        self.order
            .iter()
            .position(|a| a == id)
            .map(|i| i % self.n_learners)
    }

    /// Agents owned by `learner`.
    pub fn agents_for_learner(&self, learner: usize) -> Vec<AgentId> {
        assign_round_robin(&self.order, self.n_learners)
            .into_iter()
            .nth(learner)
            .unwrap_or_default()
    }

    /// True once every agent in `ids` has reached `total` updates.
    pub fn updates_reached(&self, ids: &[AgentId], total: u64) -> bool {
        ids.iter()
            .filter_map(|id| self.stats(id))
            .all(|s| s.updates() >= total)
    }

    /// True once every agent of the run has reached `total` updates.
    pub fn all_updates_reached(&self, total: u64) -> bool {
        self.updates_reached(&self.order, total)
    }
}

/// Split `ids` across `n_learners` partitions: index `i` goes to `i % n`.
pub fn assign_round_robin(ids: &[AgentId], n_learners: usize) -> Vec<Vec<AgentId>> {
    let mut parts = vec![Vec::new(); n_learners];
    if n_learners == 0 {
        return parts;
    }
    for (i, id) in ids.iter().enumerate() {
        parts[i % n_learners].push(id.clone());
    }
    parts
}
