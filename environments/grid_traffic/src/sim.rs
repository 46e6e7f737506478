//! Corridor simulation: `k` four-way intersections joined east to west.
//!
//! ```text
//!            N0in      N1in
//!             │         │
//!   E0 ──► ─ J0 ─ E1 ─ J1 ─ E2 ──►
//!   W0 ◄── ─    ─ W1 ─    ─ W2 ◄──
//!             │         │
//!            S0in      S1in
//! ```
//!
//! Every approach is a single lane. Vehicles go straight through, follow
//! their leader at [`VEHICLE_SPACING`], stop at the line unless their
//! movement is green, and cross one at a time per green lane per tick.

use crate::config::GridConfig;
use distributed_tsc::{
    AgentId, GreenPhase, IntersectionLayout, IntersectionObservation, LaneInfo, LaneObservation,
    Result, SignalState, Simulation, SimulationFactory, Topology, TscError, VehicleEvent,
    VehicleObservation, VEHICLE_SPACING,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};

/// Approach order of every intersection's incoming and outgoing lanes.
const SOUTHBOUND: usize = 0;
const NORTHBOUND: usize = 1;
const EASTBOUND: usize = 2;
const WESTBOUND: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vehicle {
    id: u64,
    /// Metres from the lane start.
    position: f32,
    speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LaneEnd {
    /// Stop line of `junction`; crossing vehicles move to `next`.
    Signal { junction: usize, approach: usize, next: usize },
    /// Vehicles reaching the end leave the network.
    Exit,
}

#[derive(Debug, Clone)]
struct Lane {
    info: LaneInfo,
    end: LaneEnd,
    /// Front of the queue first.
    vehicles: VecDeque<Vehicle>,
}

impl Lane {
    fn new(info: LaneInfo) -> Self {
        Self {
            info,
            end: LaneEnd::Exit,
            vehicles: VecDeque::new(),
        }
    }

    fn has_room(&self) -> bool {
        self.vehicles
            .back()
            .map_or(true, |v| v.position >= VEHICLE_SPACING)
    }

    fn front_at_stop_line(&self) -> bool {
        self.vehicles
            .front()
            .is_some_and(|v| v.position >= self.info.length)
    }

    fn observe(&self) -> LaneObservation {
        LaneObservation {
            vehicles: self
                .vehicles
                .iter()
                .map(|v| VehicleObservation {
                    id: v.id,
                    speed: v.speed,
                    position: v.position,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Junction {
    incoming: [usize; 4],
    outgoing: [usize; 4],
    signal: SignalState,
}

/// Lane arena and junction wiring of a corridor.
struct Network {
    lanes: Vec<Lane>,
    junctions: Vec<Junction>,
    /// Boundary lanes where vehicles enter.
    entries: Vec<usize>,
    topology: Topology,
}

fn junction_id(i: usize) -> AgentId {
    AgentId::new(format!("J{i}"))
}

fn build_network(config: &GridConfig) -> Network {
    let k = config.intersections;
    let mut lanes = Vec::new();
    let mut add = |name: String| {
        lanes.push(Lane::new(LaneInfo::new(
            name,
            config.lane_length,
            config.speed_limit,
        )));
        lanes.len() - 1
    };

    // corridor segment j lies west of junction j; segment k is east of the last
    let east: Vec<usize> = (0..=k).map(|j| add(format!("E{j}"))).collect();
    let west: Vec<usize> = (0..=k).map(|j| add(format!("W{j}"))).collect();

    let mut junctions = Vec::with_capacity(k);
    let mut entries = vec![east[0], west[k]];
    for i in 0..k {
        let from_n = add(format!("J{i}_from_n"));
        let from_s = add(format!("J{i}_from_s"));
        let to_s = add(format!("J{i}_to_s"));
        let to_n = add(format!("J{i}_to_n"));
        entries.push(from_n);
        entries.push(from_s);
        junctions.push(Junction {
            incoming: [from_n, from_s, east[i], west[i + 1]],
            outgoing: [to_s, to_n, east[i + 1], west[i]],
            signal: SignalState::AllRed,
        });
    }

    for (j, junction) in junctions.iter().enumerate() {
        for approach in 0..4 {
            lanes[junction.incoming[approach]].end = LaneEnd::Signal {
                junction: j,
                approach,
                next: junction.outgoing[approach],
            };
        }
    }

    let intersections = junctions
        .iter()
        .enumerate()
        .map(|(i, j)| IntersectionLayout {
            id: junction_id(i),
            incoming: j.incoming.iter().map(|&l| lanes[l].info.clone()).collect(),
            outgoing: j.outgoing.iter().map(|&l| lanes[l].info.clone()).collect(),
            phases: vec![
                GreenPhase {
                    incoming: vec![SOUTHBOUND, NORTHBOUND],
                    outgoing: vec![SOUTHBOUND, NORTHBOUND],
                },
                GreenPhase {
                    incoming: vec![EASTBOUND, WESTBOUND],
                    outgoing: vec![EASTBOUND, WESTBOUND],
                },
            ],
        })
        .collect();

    Network {
        lanes,
        junctions,
        entries,
        topology: Topology::new(intersections),
    }
}

/// Seeded corridor simulation.
pub struct GridSimulation {
    config: GridConfig,
    network: Network,
    index: HashMap<AgentId, usize>,
    rng: StdRng,
    t: u64,
    next_vehicle: u64,
    events: Vec<VehicleEvent>,
    closed: bool,
}

impl GridSimulation {
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate().map_err(TscError::config)?;
        let network = build_network(&config);
        let index = network
            .topology
            .ids()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            network,
            index,
            t: 0,
            next_vehicle: 0,
            events: Vec::new(),
            closed: false,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Vehicles currently on any lane.
    pub fn vehicles_in_network(&self) -> usize {
        self.network.lanes.iter().map(|l| l.vehicles.len()).sum()
    }

    fn junction(&self, id: &AgentId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| TscError::Simulation(format!("unknown intersection {id}")))
    }

    fn is_green(&self, junction: usize, approach: usize) -> bool {
        let Some(g) = self.network.junctions[junction].signal.green_index() else {
            return false;
        };
        self.network.topology.intersections[junction]
            .phases
            .get(g)
            .is_some_and(|p| p.incoming.contains(&approach))
    }

    /// Move at most one vehicle across each green stop line.
    fn discharge(&mut self) {
        for idx in 0..self.network.lanes.len() {
            let LaneEnd::Signal { junction, approach, next } = self.network.lanes[idx].end else {
                continue;
            };
            if !self.is_green(junction, approach)
                || !self.network.lanes[idx].front_at_stop_line()
                || !self.network.lanes[next].has_room()
            {
                continue;
            }
            if let Some(mut v) = self.network.lanes[idx].vehicles.pop_front() {
                v.position = 0.0;
                v.speed = 0.0;
                self.network.lanes[next].vehicles.push_back(v);
            }
        }
    }

    /// Car-following on every lane, then remove vehicles past an exit.
    fn advance(&mut self) {
        let t = self.t;
        for lane in self.network.lanes.iter_mut() {
            let stop = match lane.end {
                LaneEnd::Signal { .. } => lane.info.length,
                LaneEnd::Exit => f32::INFINITY,
            };
            let mut leader: Option<f32> = None;
            for v in lane.vehicles.iter_mut() {
                let limit = leader.map_or(stop, |p| p - VEHICLE_SPACING);
                let next = (v.position + lane.info.speed_limit).min(limit).max(v.position);
                v.speed = next - v.position;
                v.position = next;
                leader = Some(next);
            }
            if lane.end == LaneEnd::Exit {
                while lane
                    .vehicles
                    .front()
                    .is_some_and(|v| v.position >= lane.info.length)
                {
                    if let Some(v) = lane.vehicles.pop_front() {
                        self.events.push(VehicleEvent::Arrived { vehicle: v.id, time: t });
                    }
                }
            }
        }
    }

    /// Bernoulli arrivals on every boundary lane with room.
    fn spawn(&mut self) {
        for &idx in &self.network.entries {
            if !self.rng.gen_bool(self.config.arrival_rate) {
                continue;
            }
            let lane = &mut self.network.lanes[idx];
            if !lane.has_room() {
                continue;
            }
            let id = self.next_vehicle;
            self.next_vehicle += 1;
            lane.vehicles.push_back(Vehicle {
                id,
                position: 0.0,
                speed: lane.info.speed_limit,
            });
            self.events.push(VehicleEvent::Departed { vehicle: id, time: self.t });
        }
    }
}

impl Simulation for GridSimulation {
    fn topology(&self) -> &Topology {
        &self.network.topology
    }

    fn time(&self) -> u64 {
        self.t
    }

    fn step(&mut self) -> Result<()> {
        if self.closed {
            return Err(TscError::Simulation("step after close".into()));
        }
        self.discharge();
        self.advance();
        self.spawn();
        self.t += 1;
        Ok(())
    }

    fn observe(&self, id: &AgentId) -> Result<IntersectionObservation> {
        let j = &self.network.junctions[self.junction(id)?];
        let lanes = &self.network.lanes;
        Ok(IntersectionObservation {
            incoming: j.incoming.iter().map(|&l| lanes[l].observe()).collect(),
            outgoing: j.outgoing.iter().map(|&l| lanes[l].observe()).collect(),
        })
    }

    fn set_signal(&mut self, id: &AgentId, state: SignalState) -> Result<()> {
        let j = self.junction(id)?;
        let n_greens = self.network.topology.intersections[j].n_greens();
        if let SignalState::Green(g) | SignalState::Yellow(g) = state {
            if g >= n_greens {
                return Err(TscError::Simulation(format!(
                    "phase {g} out of range for intersection {id}"
                )));
            }
        }
        self.network.junctions[j].signal = state;
        Ok(())
    }

    fn events(&mut self) -> Vec<VehicleEvent> {
        std::mem::take(&mut self.events)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            log::debug!(
                "closing corridor at t={} with {} vehicles in network",
                self.t,
                self.vehicles_in_network()
            );
        }
        self.closed = true;
        for lane in self.network.lanes.iter_mut() {
            lane.vehicles.clear();
        }
        Ok(())
    }
}

/// Builds one [`GridSimulation`] per actor, seeded `seed + actor`.
#[derive(Clone, Debug)]
pub struct GridFactory {
    config: GridConfig,
}

impl GridFactory {
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate().map_err(TscError::config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }
}

impl SimulationFactory for GridFactory {
    fn build(&self, actor: Option<usize>) -> Result<Box<dyn Simulation>> {
        let seed = self.config.seed.wrapping_add(actor.unwrap_or(0) as u64);
        let config = self.config.clone().with_seed(seed);
        Ok(Box::new(GridSimulation::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all(sim: &mut GridSimulation, state: SignalState) {
        for id in sim.topology().ids() {
            sim.set_signal(&id, state).unwrap();
        }
    }

    fn run(sim: &mut GridSimulation, ticks: u64) -> Vec<VehicleEvent> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            sim.step().unwrap();
            events.extend(sim.events());
        }
        events
    }

    #[test]
    fn test_topology_wiring() {
        let sim = GridSimulation::new(GridConfig::new(3)).unwrap();
        let topo = sim.topology();
        assert_eq!(topo.ids(), vec![junction_id(0), junction_id(1), junction_id(2)]);
        for layout in &topo.intersections {
            assert_eq!(layout.incoming.len(), 4);
            assert_eq!(layout.outgoing.len(), 4);
            assert_eq!(layout.n_greens(), 2);
            assert_eq!(layout.state_dim(), 11);
            assert_eq!(layout.red_lanes(0), vec![EASTBOUND, WESTBOUND]);
        }
        let (j0, j1) = (&topo.intersections[0], &topo.intersections[1]);
        assert_eq!(j0.outgoing[EASTBOUND].id, j1.incoming[EASTBOUND].id);
        assert_eq!(j1.outgoing[WESTBOUND].id, j0.incoming[WESTBOUND].id);
    }

    #[test]
    fn test_red_holds_queue_at_stop_line() {
        let config = GridConfig::new(1).with_arrival_rate(1.0);
        let mut sim = GridSimulation::new(config.clone()).unwrap();
        all(&mut sim, SignalState::AllRed);
        let events = run(&mut sim, 100);
        assert!(events
            .iter()
            .all(|e| matches!(e, VehicleEvent::Departed { .. })));

        let obs = sim.observe(&junction_id(0)).unwrap();
        let capacity = (config.lane_length / VEHICLE_SPACING) as usize + 1;
        for lane in &obs.incoming {
            assert_eq!(lane.count(), capacity);
            assert_eq!(lane.queued(0.1), capacity);
            let front = lane
                .vehicles
                .iter()
                .map(|v| v.position)
                .fold(0.0, f32::max);
            assert_eq!(front, config.lane_length);
        }
        assert!(obs.outgoing.iter().all(LaneObservation::is_empty));
    }

    #[test]
    fn test_green_corridor_delivers_vehicles() {
        let config = GridConfig::new(2).with_arrival_rate(0.3).with_seed(3);
        let mut sim = GridSimulation::new(config.clone()).unwrap();
        all(&mut sim, SignalState::Green(1));
        let events = run(&mut sim, 400);

        let mut departed = HashMap::new();
        let mut travel = Vec::new();
        for e in events {
            match e {
                VehicleEvent::Departed { vehicle, time } => {
                    departed.insert(vehicle, time);
                }
                VehicleEvent::Arrived { vehicle, time } => travel.push(time - departed[&vehicle]),
            }
        }
        assert!(!travel.is_empty());
        // three lanes of 150 m at 13.9 m per tick
        let free_flow = (3.0 * config.lane_length / config.speed_limit).floor() as u64;
        assert!(travel.iter().all(|&t| t >= free_flow));
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = GridConfig::new(2).with_arrival_rate(0.4).with_seed(11);
        let mut a = GridSimulation::new(config.clone()).unwrap();
        let mut b = GridSimulation::new(config).unwrap();
        all(&mut a, SignalState::Green(0));
        all(&mut b, SignalState::Green(0));
        assert_eq!(run(&mut a, 200), run(&mut b, 200));
    }

    #[test]
    fn test_factory_offsets_seed_by_actor() {
        let factory = GridFactory::new(GridConfig::new(1).with_arrival_rate(0.5).with_seed(1)).unwrap();
        let mut events = Vec::new();
        for actor in [Some(0), Some(1)] {
            let mut sim = factory.build(actor).unwrap();
            let mut departures = Vec::new();
            for _ in 0..100 {
                sim.step().unwrap();
                departures.extend(sim.events());
            }
            events.push(departures);
        }
        assert_ne!(events[0], events[1]);
        assert!(GridFactory::new(GridConfig::new(0)).is_err());
    }

    #[test]
    fn test_signal_and_lifecycle_errors() {
        let mut sim = GridSimulation::new(GridConfig::new(1)).unwrap();
        assert!(sim.set_signal(&AgentId::from("nope"), SignalState::AllRed).is_err());
        assert!(sim.set_signal(&junction_id(0), SignalState::Green(2)).is_err());
        assert!(sim.observe(&AgentId::from("nope")).is_err());

        sim.step().unwrap();
        sim.close().unwrap();
        assert_eq!(sim.vehicles_in_network(), 0);
        assert!(sim.step().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_spacing_and_bounds_hold(seed in 0u64..1000, switches in proptest::collection::vec(0usize..3, 1..12)) {
            let config = GridConfig::new(2).with_arrival_rate(0.5).with_seed(seed);
            let mut sim = GridSimulation::new(config).unwrap();
            for s in switches {
                let state = match s {
                    0 => SignalState::Green(0),
                    1 => SignalState::Green(1),
                    _ => SignalState::AllRed,
                };
                all(&mut sim, state);
                for _ in 0..15 {
                    sim.step().unwrap();
                }
                for lane in &sim.network.lanes {
                    let positions: Vec<f32> = lane.vehicles.iter().map(|v| v.position).collect();
                    for pair in positions.windows(2) {
                        prop_assert!(pair[0] - pair[1] >= VEHICLE_SPACING - 1e-3);
                    }
                    if let LaneEnd::Signal { .. } = lane.end {
                        prop_assert!(positions.iter().all(|&p| (0.0..=lane.info.length).contains(&p)));
                    }
                }
            }
        }
    }
}
