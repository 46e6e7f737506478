//! Actor worker: runs simulation episodes and feeds the shared replays.
//!
//! # Lifecycle
//!
//! ```text
//! build sim + networks ─► barrier ─► pull weights ─► run offset ─► barrier
//!        ┌──────────────────────────────────────────────────────────┘
//!        ▼
//!   episode: build controllers ─► tick until sim_len ─► report ─► close
//!        └── repeat while training and any agent is short of its updates
//! ```
//!
//! In test mode a single episode runs and the controllers' metric histories
//! are written out. Non-learning controllers also run a single episode.

use crate::agents::{pull_online_weights, Agent, AgentConfig};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::RunConfig;
use crate::controllers::{Controller, ControllerKind, MetricHistory};
use crate::core::{AgentId, SharedState};
use crate::environment::{Simulation, SimulationFactory, Topology};
use crate::error::{Result, TscError};
use crate::metrics::{append_travel_time, tracks_travel_time, write_test_metrics, TravelTimes};
use crate::nn::{AgentNetworks, NetworkDims, NetworkFactory};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Per-actor settings chosen by the orchestrator.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// Actor index, also the simulation seed offset.
    pub actor_id: usize,
    /// Exploration rate of every agent this actor drives.
    pub epsilon: f32,
    /// Ticks simulated before controllers start acting on the first episode.
    pub offset: u64,
}

impl ActorConfig {
    pub fn new(actor_id: usize) -> Self {
        Self {
            actor_id,
            epsilon: 1.0,
            offset: 0,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err("epsilon must be in [0, 1]");
        }
        Ok(())
    }
}

/// Outcome of one actor episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub actor: usize,
    /// Episode number, starting at 1.
    pub episode: usize,
    pub epsilon: f32,
    /// Trips completed during the episode.
    pub vehicles: usize,
    pub mean_travel_time: f64,
    pub std_travel_time: f64,
    pub wall_secs: f64,
}

/// Messages from actors to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorReport {
    EpisodeFinished(EpisodeSummary),
    /// The actor left its episode loop.
    Finished { actor: usize, episodes: usize },
}

/// Handle to a spawned actor thread.
pub struct ActorHandle {
    pub thread: JoinHandle<Result<()>>,
    name: String,
}

impl ActorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Wait for the actor. A panic becomes [`TscError::WorkerPanicked`].
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .map_err(|_| TscError::WorkerPanicked(self.name))?
    }
}

/// One actor worker, ready to run on its own thread.
pub struct ActorWorker {
    config: ActorConfig,
    run: Arc<RunConfig>,
    kind: ControllerKind,
    shared: Arc<SharedState>,
    sims: Arc<dyn SimulationFactory>,
    nets: Arc<dyn NetworkFactory>,
    reports: Sender<ActorReport>,
}

impl ActorWorker {
    pub fn new(
        config: ActorConfig,
        run: Arc<RunConfig>,
        shared: Arc<SharedState>,
        sims: Arc<dyn SimulationFactory>,
        nets: Arc<dyn NetworkFactory>,
        reports: Sender<ActorReport>,
    ) -> Result<Self> {
        config.validate().map_err(TscError::config)?;
        let kind = run.controller.parse()?;
        Ok(Self {
            config,
            run,
            kind,
            shared,
            sims,
            nets,
            reports,
        })
    }

    pub fn thread_name(&self) -> String {
        format!("tsc-actor-{}", self.config.actor_id)
    }

    /// Run [`run`](Self::run) on a named thread.
    pub fn spawn(self) -> Result<ActorHandle> {
        let name = self.thread_name();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let id = self.config.actor_id;
                let result = self.run();
                if let Err(e) = &result {
                    log::error!("actor {id} failed: {e}");
                }
                result
            })?;
        Ok(ActorHandle { thread, name })
    }

    /// Full actor lifecycle. Blocks on the shared barrier twice.
    pub fn run(self) -> Result<()> {
        let id = self.config.actor_id;
        let train = self.run.mode.is_train();
        let mut sim = self.sims.build(Some(id))?;
        let topology = sim.topology().clone();
        let mut networks = self.build_networks(&topology)?;

        log::info!("actor {id} waiting at weight sync barrier");
        self.shared.barrier().wait();
        if train && self.run.learners > 0 {
            for (agent, nets) in networks.iter_mut() {
                let stats = self
                    .shared
                    .stats(agent)
                    .ok_or_else(|| TscError::config(format!("no shared stats for agent {agent}")))?;
                pull_online_weights(nets, stats)?;
            }
        }

        let mut travel = TravelTimes::new();
        while sim.time() < self.config.offset {
            sim.step()?;
            travel.record_all(sim.events());
        }
        log::info!(
            "actor {id} reached offset {} at t={}, waiting for the other actors",
            self.config.offset,
            sim.time()
        );
        self.shared.barrier().wait();

        let repeat = train && self.kind.is_learning();
        let mut episode = 0;
        loop {
            if repeat && self.shared.all_updates_reached(self.run.rl.updates) {
                sim.close()?;
                break;
            }
            episode += 1;
            let start = Instant::now();
            let histories = self.run_episode(sim.as_mut(), &topology, &mut networks, &mut travel)?;
            sim.close()?;
            self.finish_episode(episode, start, &travel, &histories)?;

            if !repeat {
                break;
            }
            sim = self.sims.build(Some(id))?;
            travel = TravelTimes::new();
        }

        let _ = self.reports.send(ActorReport::Finished {
            actor: id,
            episodes: episode,
        });
        log::info!("actor {id} finished after {episode} episodes");
        Ok(())
    }

    fn build_networks(&self, topology: &Topology) -> Result<BTreeMap<AgentId, AgentNetworks>> {
        let mut networks = BTreeMap::new();
        let Some(kind) = self.kind.agent_kind() else {
            return Ok(networks);
        };
        let load = !self.run.mode.is_train() && self.run.io.load;
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(
            &self.run.io.save_path,
            self.kind.as_str(),
        ));
        for layout in &topology.intersections {
            let dims = NetworkDims::new(layout.state_dim(), kind.output_dim(layout.n_greens()));
            let mut nets = self.nets.build(kind, dims, false);
            if load {
                checkpointer.load_networks(&layout.id, &mut nets)?;
            }
            networks.insert(layout.id.clone(), nets);
        }
        Ok(networks)
    }

    /// Drive one episode from the simulation's current time to `sim_len`.
    /// Networks are lent to the episode's agents and returned afterwards.
    fn run_episode(
        &self,
        sim: &mut dyn Simulation,
        topology: &Topology,
        networks: &mut BTreeMap<AgentId, AgentNetworks>,
        travel: &mut TravelTimes,
    ) -> Result<Vec<(AgentId, MetricHistory)>> {
        let agent_config = AgentConfig::from_run(&self.run);
        let mut controllers = Vec::with_capacity(topology.len());
        for layout in &topology.intersections {
            let agent = match networks.remove(&layout.id) {
                Some(nets) => {
                    let shared = self.shared.agent(&layout.id).ok_or_else(|| {
                        TscError::config(format!("no shared state for agent {}", layout.id))
                    })?;
                    Some(Agent::new(
                        layout.id.clone(),
                        nets,
                        shared,
                        agent_config.clone(),
                        self.config.epsilon,
                        layout.n_greens(),
                    ))
                }
                None => None,
            };
            controllers.push(Controller::new(self.kind, layout.clone(), &self.run, agent)?);
        }

        while sim.time() < self.run.sim_len {
            for controller in controllers.iter_mut() {
                let obs = sim.observe(controller.id())?;
                if let Some(state) = controller.step(&obs)? {
                    sim.set_signal(controller.id(), state)?;
                }
            }
            sim.step()?;
            travel.record_all(sim.events());
        }

        let mut histories = Vec::new();
        for mut controller in controllers {
            let id = controller.id().clone();
            if let Some(history) = controller.take_history() {
                histories.push((id.clone(), history));
            }
            if let Some(agent) = controller.into_agent() {
                networks.insert(id, agent.into_networks());
            }
        }
        Ok(histories)
    }

    fn finish_episode(
        &self,
        episode: usize,
        start: Instant,
        travel: &TravelTimes,
        histories: &[(AgentId, MetricHistory)],
    ) -> Result<()> {
        let id = self.config.actor_id;
        let eps = self.config.epsilon;
        let (mean, std) = travel.summary();
        let summary = EpisodeSummary {
            actor: id,
            episode,
            epsilon: eps,
            vehicles: travel.times().len(),
            mean_travel_time: mean,
            std_travel_time: std,
            wall_secs: start.elapsed().as_secs_f64(),
        };
        log::info!(
            "actor {id} episode {episode} done in {:.1}s: {} trips, travel time {mean:.1} ± {std:.1}",
            summary.wall_secs,
            summary.vehicles
        );

        if tracks_travel_time(eps) {
            append_travel_time(&self.run.io.progress_dir, eps, mean, std)?;
        }
        if !self.run.mode.is_train() {
            let dir = self
                .run
                .io
                .metrics_dir
                .join(self.kind.as_str())
                .join(format!("actor_{id}"));
            write_test_metrics(&dir, histories, travel)?;
        }
        let _ = self.reports.send(ActorReport::EpisodeFinished(summary));
        Ok(())
    }
}
