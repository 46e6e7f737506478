//! Simulation abstraction for distributed training.
//!
//! Actors drive a [`Simulation`] one tick at a time: observe every
//! intersection, let its controller decide, push the resulting signal state
//! back, then step. Simulations are built inside the worker that uses them
//! through a [`SimulationFactory`]; the orchestrator builds one extra dry-run
//! instance to discover the topology.

use crate::controllers::SignalState;
use crate::core::AgentId;
use crate::error::Result;

/// Average vehicle length plus stopped headway, in metres.
pub const VEHICLE_SPACING: f32 = 7.5;

/// Static description of one lane.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneInfo {
    pub id: String,
    /// Metres.
    pub length: f32,
    /// Metres per tick.
    pub speed_limit: f32,
}

impl LaneInfo {
    pub fn new(id: impl Into<String>, length: f32, speed_limit: f32) -> Self {
        Self {
            id: id.into(),
            length,
            speed_limit,
        }
    }

    /// Vehicles the lane holds when fully queued.
    pub fn capacity(&self) -> f32 {
        (self.length / VEHICLE_SPACING).max(1.0)
    }

    /// Ticks needed to traverse the lane at the speed limit.
    pub fn free_flow_time(&self) -> f32 {
        if self.speed_limit > 0.0 {
            self.length / self.speed_limit
        } else {
            0.0
        }
    }
}

/// Lanes released by one green phase, as indices into the layout's
/// incoming and outgoing lane lists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GreenPhase {
    pub incoming: Vec<usize>,
    pub outgoing: Vec<usize>,
}

/// One signalised intersection.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionLayout {
    pub id: AgentId,
    pub incoming: Vec<LaneInfo>,
    pub outgoing: Vec<LaneInfo>,
    /// Ordered green phases; a discrete action is an index into this list.
    pub phases: Vec<GreenPhase>,
}

impl IntersectionLayout {
    pub fn n_greens(&self) -> usize {
        self.phases.len()
    }

    /// Incoming lanes that are red under green phase `phase`.
    pub fn red_lanes(&self, phase: usize) -> Vec<usize> {
        let green = self.phases.get(phase).map(|p| p.incoming.as_slice()).unwrap_or(&[]);
        let mut red: Vec<usize> = self
            .phases
            .iter()
            .flat_map(|p| p.incoming.iter().copied())
            .filter(|l| !green.contains(l))
            .collect();
        red.sort_unstable();
        red.dedup();
        red
    }

    /// Width of the RL state vector: density and queue per incoming lane plus
    /// a one-hot over the greens and all-red.
    pub fn state_dim(&self) -> usize {
        2 * self.incoming.len() + self.n_greens() + 1
    }
}

/// Every controlled intersection of a network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Topology {
    pub intersections: Vec<IntersectionLayout>,
}

impl Topology {
    pub fn new(intersections: Vec<IntersectionLayout>) -> Self {
        Self { intersections }
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.intersections.iter().map(|i| i.id.clone()).collect()
    }

    pub fn get(&self, id: &AgentId) -> Option<&IntersectionLayout> {
        self.intersections.iter().find(|i| &i.id == id)
    }

    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }
}

/// One vehicle on an observed lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleObservation {
    pub id: u64,
    /// Metres per tick.
    pub speed: f32,
    /// Metres travelled from the lane's start.
    pub position: f32,
}

/// Vehicles on one lane.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaneObservation {
    pub vehicles: Vec<VehicleObservation>,
}

impl LaneObservation {
    pub fn count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Vehicles slower than `stop_speed`.
    pub fn queued(&self, stop_speed: f32) -> usize {
        self.vehicles.iter().filter(|v| v.speed < stop_speed).count()
    }
}

/// Per-tick snapshot of one intersection, lanes ordered as in its layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntersectionObservation {
    pub incoming: Vec<LaneObservation>,
    pub outgoing: Vec<LaneObservation>,
}

impl IntersectionObservation {
    pub fn empty(layout: &IntersectionLayout) -> Self {
        Self {
            incoming: vec![LaneObservation::default(); layout.incoming.len()],
            outgoing: vec![LaneObservation::default(); layout.outgoing.len()],
        }
    }

    pub fn incoming_count(&self, lane: usize) -> usize {
        self.incoming.get(lane).map(LaneObservation::count).unwrap_or(0)
    }

    pub fn outgoing_count(&self, lane: usize) -> usize {
        self.outgoing.get(lane).map(LaneObservation::count).unwrap_or(0)
    }

    /// Whether every incoming lane is empty.
    pub fn is_empty(&self) -> bool {
        self.incoming.iter().all(LaneObservation::is_empty)
    }
}

/// Vehicle lifecycle event, drained from the simulation after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEvent {
    Departed { vehicle: u64, time: u64 },
    Arrived { vehicle: u64, time: u64 },
}

/// A stepped traffic simulation.
pub trait Simulation: Send {
    fn topology(&self) -> &Topology;

    /// Current tick.
    fn time(&self) -> u64;

    /// Advance one tick.
    fn step(&mut self) -> Result<()>;

    fn observe(&self, id: &AgentId) -> Result<IntersectionObservation>;

    fn set_signal(&mut self, id: &AgentId, state: SignalState) -> Result<()>;

    /// Departures and arrivals since the previous call.
    fn events(&mut self) -> Vec<VehicleEvent>;

    fn close(&mut self) -> Result<()>;
}

/// Builds simulations inside worker threads.
pub trait SimulationFactory: Send + Sync {
    /// `actor` is the building actor's index, `None` for the orchestrator's
    /// topology dry run.
    fn build(&self, actor: Option<usize>) -> Result<Box<dyn Simulation>>;
}
