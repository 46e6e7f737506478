//! Synthetic signalised-corridor traffic simulator.
//!
//! A deterministic stand-in for a microscopic simulator, implementing
//! [`distributed_tsc::Simulation`]. Each tick:
//!
//! 1. one vehicle crosses each green stop line if the downstream lane has room;
//! 2. vehicles advance at the speed limit, never closer than
//!    [`VEHICLE_SPACING`](distributed_tsc::VEHICLE_SPACING) to their leader
//!    and never past a stop line;
//! 3. boundary lanes receive a vehicle with probability `arrival_rate`.
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_traffic::{GridConfig, GridFactory};
//!
//! let factory = GridFactory::new(GridConfig::new(2).with_arrival_rate(0.12))?;
//! let orchestrator = Orchestrator::new(run_config, Arc::new(factory), nets)?;
//! ```

pub mod config;
pub mod sim;

pub use config::GridConfig;
pub use sim::{GridFactory, GridSimulation};
