//! Learner workers.
//!
//! Each [`LearnerWorker`] owns a round-robin share of the agents, trains them
//! from their shared replays and publishes the resulting weights through
//! their [`AgentStats`](crate::core::AgentStats).

pub mod learner;

#[cfg(test)]
mod tests;

pub use learner::{LearnerConfig, LearnerHandle, LearnerStats, LearnerWorker};
