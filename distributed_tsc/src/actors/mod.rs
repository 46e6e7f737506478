//! Actor workers.
//!
//! - [`ActorWorker`]: runs simulation episodes on its own thread, driving one
//!   controller per intersection and appending experience to the shared replays
//! - [`ActorReport`]: per-episode summaries sent back to the orchestrator

pub mod actor;

#[cfg(test)]
mod tests;

pub use actor::{ActorConfig, ActorHandle, ActorReport, ActorWorker, EpisodeSummary};
