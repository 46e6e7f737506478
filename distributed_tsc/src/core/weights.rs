//! Versioned weight messages published by learners and read by actors.
//!
//! Network parameters cross worker boundaries as serialised bytes. Each
//! publication is wrapped in a [`WeightMessage`] carrying the owning agent,
//! the network role, a per-key version and the publish time, so a reader can
//! tell whether the copy it holds is stale and by how much.
//!
//! ```text
//! Learner Thread                                 Actor Thread
//! ┌──────────────────┐                           ┌──────────────────┐
//! │ train_batch()    │                           │ get_action()     │
//! │       ↓          │                           │       ↑          │
//! │ get_weights()    │                           │ set_weights()    │
//! │       ↓          │      WeightBoard          │       ↑          │
//! │ publish(key, b) ─┼──► {key → WeightMessage} ─┼─► latest_newer() │
//! └──────────────────┘                           └──────────────────┘
//! ```

use crate::core::AgentId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Which network of an agent a blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
    /// Q-network (discrete) or deterministic policy (continuous).
    Policy,
    /// Learner-only action-value estimator of continuous agents.
    Critic,
}

/// Online (trained) or target (bootstrap) copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetRole {
    Online,
    Target,
}

/// Key of a published blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeightKey {
    pub network: Network,
    pub role: NetRole,
}

impl WeightKey {
    pub const POLICY_ONLINE: WeightKey = WeightKey::new(Network::Policy, NetRole::Online);
    pub const POLICY_TARGET: WeightKey = WeightKey::new(Network::Policy, NetRole::Target);
    pub const CRITIC_ONLINE: WeightKey = WeightKey::new(Network::Critic, NetRole::Online);

    pub const fn new(network: Network, role: NetRole) -> Self {
        Self { network, role }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let net = match self.network {
            Network::Policy => "policy",
            Network::Critic => "critic",
        };
        let role = match self.role {
            NetRole::Online => "online",
            NetRole::Target => "target",
        };
        write!(f, "{}_{}", net, role)
    }
}

/// One publication of serialised parameters.
#[derive(Debug, Clone)]
pub struct WeightMessage {
    pub agent: AgentId,
    pub key: WeightKey,
    pub payload: Arc<Vec<u8>>,
    /// Per-key version, starting at 1 for the first publication.
    pub version: u64,
    pub published_at: SystemTime,
}

impl WeightMessage {
    /// Check if a reader holding `held_version` is behind this message.
    pub fn is_newer_than(&self, held_version: u64) -> bool {
        self.version > held_version
    }
}

/// Latest weight message per key for a single agent.
pub struct WeightBoard {
    agent: AgentId,
    slots: RwLock<HashMap<WeightKey, WeightMessage>>,
}

impl WeightBoard {
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a new blob under `key`, replacing any previous one.
    ///
    /// Returns the new version.
    pub fn publish(&self, key: WeightKey, payload: Vec<u8>) -> u64 {
        let mut slots = self.slots.write();
        let version = slots.get(&key).map(|m| m.version + 1).unwrap_or(1);
        slots.insert(
            key,
            WeightMessage {
                agent: self.agent.clone(),
                key,
                payload: Arc::new(payload),
                version,
                published_at: SystemTime::now(),
            },
        );
        version
    }

    /// Latest message for `key`, if any has been published.
    pub fn latest(&self, key: WeightKey) -> Option<WeightMessage> {
        self.slots.read().get(&key).cloned()
    }

    /// Latest message for `key` only if it is newer than `held_version`.
    pub fn latest_newer(&self, key: WeightKey, held_version: u64) -> Option<WeightMessage> {
        self.slots
            .read()
            .get(&key)
            .filter(|m| m.is_newer_than(held_version))
            .cloned()
    }

    /// Current version for `key` (0 if never published).
    pub fn version(&self, key: WeightKey) -> u64 {
        self.slots.read().get(&key).map(|m| m.version).unwrap_or(0)
    }
}
