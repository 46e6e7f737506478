//! # Distributed TSC: multi-actor, multi-learner traffic signal control
//!
//! Actors drive traffic simulations with a signal controller per
//! intersection; learners train one agent per intersection from the
//! experience the actors share.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Thread 1          Thread 2          Thread N                       │
//! │  ┌────────┐        ┌────────┐        ┌────────┐                     │
//! │  │Actor 0 │        │Actor 1 │        │Actor N │                     │
//! │  │ sim    │        │ sim    │        │ sim    │                     │
//! │  │ eps=1  │        │ eps=.5 │        │ eps=min│                     │
//! │  └───┬────┘        └───┬────┘        └───┬────┘                     │
//! │      └─────────────────┼─────────────────┘                          │
//! │                        ▼                                            │
//! │   ┌───────────────────────────┐      ┌──────────────────────┐       │
//! │   │ ExperienceReplay / agent  │      │ AgentStats / agent   │       │
//! │   │ (RwLock, trim by learner) │      │ counters + weights   │       │
//! │   └────────────┬──────────────┘      └──────────┬───────────┘       │
//! │                ▼                                │                   │
//! │   ┌───────────────────────────┐                 │                   │
//! │   │ Learner j: agents i % l   │─── publish ─────┘                   │
//! │   └───────────────────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use distributed_tsc::{BurnNetworkFactory, Mode, Orchestrator, RunConfig};
//!
//! let config = RunConfig::new()
//!     .with_controller("dqn")
//!     .with_mode(Mode::Train)
//!     .with_actors(4)
//!     .with_learners(1);
//!
//! let nets: BurnNetworkFactory = BurnNetworkFactory::new(config.nn.clone());
//! let summary = Orchestrator::new(config, Arc::new(my_sim_factory), Arc::new(nets))?.run()?;
//! ```

pub mod actors;
pub mod agents;
pub mod checkpoint;
pub mod config;
pub mod controllers;
pub mod core;
pub mod environment;
pub mod error;
pub mod learner;
pub mod logging;
pub mod metrics;
pub mod nn;
pub mod orchestrator;

pub use crate::core::{
    assign_round_robin, barrier, shared_replay, Action, AgentId, AgentStats, Barrier,
    BarrierWaitResult, Experience, ExperienceReplay, NetRole, SharedAgentStats, SharedBarrier,
    SharedReplay, SharedState, Trajectory, WeightBoard, WeightKey, WeightMessage,
};

pub use actors::{ActorConfig, ActorHandle, ActorReport, ActorWorker, EpisodeSummary};
pub use agents::{distribute_weights, pull_online_weights, Agent, AgentConfig, AgentKind};
pub use learner::{LearnerConfig, LearnerHandle, LearnerStats, LearnerWorker};

pub use controllers::{Controller, ControllerKind, MetricHistory, Policy, SignalState, TrafficMetrics};

pub use config::{
    ExplorationSchedule, IoConfig, Mode, NnConfig, RlConfig, RunConfig, SignalTiming, SotlConfig,
    WebsterConfig,
};
pub use error::{Result, TscError};

// Simulation abstraction
pub use environment::{
    GreenPhase, IntersectionLayout, IntersectionObservation, LaneInfo, LaneObservation,
    Simulation, SimulationFactory, Topology, VehicleEvent, VehicleObservation, VEHICLE_SPACING,
};

pub use nn::{AgentNetworks, BurnNetworkFactory, DefaultBackend, NetworkDims, NetworkFactory};

pub use checkpoint::{Checkpointer, CheckpointerConfig};
pub use logging::{init_logging, level_from_verbosity};
pub use metrics::{ProgressColumn, ProgressWriter, TravelTimes};
pub use orchestrator::{Orchestrator, RunSummary};
