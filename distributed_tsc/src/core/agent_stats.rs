//! Shared per-agent training record.
//!
//! Write discipline: the update and available-experience counters are
//! mutated only by the learner that owns the agent. Actors only raise the
//! max-abs-reward (a commutative max) and read everything else.

use crate::core::weights::{WeightBoard, WeightKey, WeightMessage};
use crate::core::AgentId;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters and published weights for one agent.
pub struct AgentStats {
    agent: AgentId,
    updates: AtomicU64,
    available: AtomicI64,
    /// f32 bits; only ever raised.
    max_abs_reward: AtomicU32,
    weights: WeightBoard,
}

impl AgentStats {
    pub fn new(agent: AgentId) -> Self {
        Self {
            weights: WeightBoard::new(agent.clone()),
            agent,
            updates: AtomicU64::new(0),
            available: AtomicI64::new(0),
            max_abs_reward: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// Completed training steps.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }

    /// Record one training step. Returns the new count.
    pub fn increment_updates(&self) -> u64 {
        self.updates.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Trajectories not yet consumed by a training step.
    pub fn available_experience(&self) -> i64 {
        self.available.load(Ordering::Acquire)
    }

    /// Overwrite the available count (first replay fill).
    pub fn reset_available_experience(&self, count: usize) {
        self.available.store(count as i64, Ordering::Release);
    }

    /// Credit newly appended trajectories.
    pub fn add_available_experience(&self, count: u64) {
        self.available.fetch_add(count as i64, Ordering::AcqRel);
    }

    /// Consume one unit after a training step.
    pub fn decrement_available_experience(&self) {
        self.available.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn max_abs_reward(&self) -> f32 {
        f32::from_bits(self.max_abs_reward.load(Ordering::Acquire))
    }

    /// Raise the max-abs-reward to `|reward|` if larger.
    pub fn observe_reward(&self, reward: f32) {
        let candidate = reward.abs();
        if !candidate.is_finite() {
            return;
        }
        let mut current = self.max_abs_reward.load(Ordering::Acquire);
        while candidate > f32::from_bits(current) {
            match self.max_abs_reward.compare_exchange_weak(
                current,
                candidate.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Divisor for reward normalisation. Zero (nothing observed yet) maps to 1.
    pub fn reward_scale(&self) -> f32 {
        let max = self.max_abs_reward();
        if max > 0.0 {
            max
        } else {
            1.0
        }
    }

    /// Publish serialised parameters for `key`. Returns the new version.
    pub fn publish_weights(&self, key: WeightKey, payload: Vec<u8>) -> u64 {
        self.weights.publish(key, payload)
    }

    pub fn weights(&self, key: WeightKey) -> Option<WeightMessage> {
        self.weights.latest(key)
    }

    pub fn weights_newer_than(&self, key: WeightKey, held_version: u64) -> Option<WeightMessage> {
        self.weights.latest_newer(key, held_version)
    }

    pub fn weight_version(&self, key: WeightKey) -> u64 {
        self.weights.version(key)
    }
}

/// Shared handle to agent stats.
pub type SharedAgentStats = Arc<AgentStats>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn stats() -> AgentStats {
        AgentStats::new(AgentId::from("a"))
    }

    #[test]
    fn test_initial_state() {
        let s = stats();
        assert_eq!(s.updates(), 0);
        assert_eq!(s.available_experience(), 0);
        assert_eq!(s.max_abs_reward(), 0.0);
        assert_eq!(s.reward_scale(), 1.0);
    }

    #[test]
    fn test_max_reward_monotonic() {
        let s = stats();
        s.observe_reward(-12.0);
        s.observe_reward(3.0);
        s.observe_reward(f32::NAN);
        assert_eq!(s.max_abs_reward(), 12.0);
        s.observe_reward(-20.5);
        assert_eq!(s.reward_scale(), 20.5);
    }

    #[test]
    fn test_available_counter() {
        let s = stats();
        s.add_available_experience(3);
        s.reset_available_experience(100);
        s.decrement_available_experience();
        s.add_available_experience(2);
        assert_eq!(s.available_experience(), 101);
    }

    #[test]
    fn test_updates_increment() {
        let s = stats();
        assert_eq!(s.increment_updates(), 1);
        assert_eq!(s.increment_updates(), 2);
        assert_eq!(s.updates(), 2);
    }

    #[test]
    fn test_concurrent_reward_observers() {
        let s = Arc::new(stats());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let s = Arc::clone(&s);
                thread::spawn(move || {
                    for i in 0..1000 {
                        s.observe_reward(-((t * 1000 + i) as f32));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.max_abs_reward(), 7999.0);
    }

    #[test]
    fn test_weight_publication() {
        let s = stats();
        assert!(s.weights(WeightKey::POLICY_ONLINE).is_none());
        s.publish_weights(WeightKey::POLICY_ONLINE, vec![1, 2]);
        assert_eq!(s.weight_version(WeightKey::POLICY_ONLINE), 1);
        assert!(s.weights_newer_than(WeightKey::POLICY_ONLINE, 0).is_some());
        assert!(s.weights_newer_than(WeightKey::POLICY_ONLINE, 1).is_none());
    }
}
