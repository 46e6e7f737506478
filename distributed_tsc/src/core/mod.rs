//! Core shared-memory primitives for actor/learner coordination.

pub mod agent_stats;
pub mod barrier;
pub mod experience;
pub mod experience_replay;
pub mod shared_state;
pub mod weights;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a learning agent: the id of the intersection it controls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub use agent_stats::{AgentStats, SharedAgentStats};
pub use barrier::{barrier, Barrier, BarrierWaitResult, SharedBarrier};
pub use experience::{Action, Experience, Trajectory};
pub use experience_replay::{shared_replay, ExperienceReplay, SharedReplay};
pub use shared_state::{assign_round_robin, AgentShared, SharedState};
pub use weights::{NetRole, Network, WeightBoard, WeightKey, WeightMessage};
