//! Run orchestration: validates the configuration, builds the shared state
//! and runs every actor and learner on its own thread.
//!
//! ```text
//!                       ┌──────────────┐
//!                       │ Orchestrator │  dry-run sim -> topology
//!                       └──────┬───────┘
//!          ┌───────────────────┼────────────────────┐
//!          ▼                   ▼                    ▼
//!   ┌────────────┐      ┌────────────┐       ┌────────────┐
//!   │ actor 0    │ ...  │ actor n-1  │       │ learner j  │ x l
//!   │ eps, offset│      │ eps, offset│       │ agents i%l │
//!   └─────┬──────┘      └─────┬──────┘       └─────┬──────┘
//!         └──── replays / stats / barrier ─────────┘
//!                      (SharedState)
//! ```
//!
//! The orchestrator does no supervision: a failing worker is reported after
//! every thread has been joined.

use crate::actors::{ActorConfig, ActorReport, ActorWorker, EpisodeSummary};
use crate::config::{ExplorationSchedule, Mode, RunConfig};
use crate::controllers::ControllerKind;
use crate::core::SharedState;
use crate::environment::{SimulationFactory, Topology};
use crate::error::{Result, TscError};
use crate::learner::{LearnerConfig, LearnerStats, LearnerWorker};
use crate::nn::NetworkFactory;
use crossbeam_channel::unbounded;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of learners a run actually uses.
///
/// Learning controllers need at least one learner in train mode; test runs
/// and non-learning controllers never have any.
pub fn resolve_learners(kind: ControllerKind, mode: Mode, requested: usize) -> usize {
    match (kind.is_learning(), mode) {
        (true, Mode::Train) => requested.max(1),
        _ => 0,
    }
}

/// Exploration rate of each of `n` actors.
pub fn exploration_rates(mode: Mode, schedule: ExplorationSchedule, eps: f32, n: usize) -> Vec<f32> {
    match (mode, schedule) {
        (Mode::Test, _) => vec![eps; n],
        (Mode::Train, ExplorationSchedule::Tiered) => {
            let tiers = [1.0, 0.5, eps];
            (0..n).map(|i| tiers[i % tiers.len()]).collect()
        }
        (Mode::Train, ExplorationSchedule::Linear) => {
            if n == 1 {
                return vec![eps];
            }
            let step = (eps - 1.0) / (n - 1) as f32;
            // last actor gets `eps` exactly
            (0..n)
                .map(|i| if i + 1 == n { eps } else { 1.0 + step * i as f32 })
                .collect()
        }
    }
}

/// Start offset, in ticks, of each of `n` actors: evenly spread over
/// `[0, sim_len * offset]` in train mode, all zero in test mode.
pub fn start_offsets(mode: Mode, sim_len: u64, offset: f64, n: usize) -> Vec<u64> {
    if mode == Mode::Test || n <= 1 {
        return vec![0; n];
    }
    let end = sim_len as f64 * offset;
    (0..n)
        .map(|i| (end * i as f64 / (n - 1) as f64) as u64)
        .collect()
}

/// What a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub controller: String,
    pub actors: usize,
    pub learners: usize,
    /// Every episode report, in arrival order.
    pub episodes: Vec<EpisodeSummary>,
    /// Actor index -> episodes completed.
    pub actor_episodes: BTreeMap<usize, usize>,
    pub learner_stats: Vec<LearnerStats>,
    pub wall_secs: f64,
}

impl RunSummary {
    /// Mean travel time over the episodes of the greediest actor.
    pub fn greedy_travel_time(&self) -> Option<f64> {
        let eps = self
            .episodes
            .iter()
            .map(|e| e.epsilon)
            .fold(f32::INFINITY, f32::min);
        let times: Vec<f64> = self
            .episodes
            .iter()
            .filter(|e| e.epsilon == eps)
            .map(|e| e.mean_travel_time)
            .collect();
        if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        }
    }
}

/// Owns a validated run configuration and its collaborators.
pub struct Orchestrator {
    run: Arc<RunConfig>,
    kind: ControllerKind,
    sims: Arc<dyn SimulationFactory>,
    nets: Arc<dyn NetworkFactory>,
    rates: Vec<f32>,
    offsets: Vec<u64>,
}

impl Orchestrator {
    /// Validate `run` and settle the actor/learner split.
    ///
    /// Unknown controller names and invalid parameters fail here, before
    /// any thread starts.
    pub fn new(
        mut run: RunConfig,
        sims: Arc<dyn SimulationFactory>,
        nets: Arc<dyn NetworkFactory>,
    ) -> Result<Self> {
        let kind: ControllerKind = run.controller.parse()?;
        run.check()?;
        if run.actors == 0 {
            log::warn!("no actors requested, running with 1");
            run.actors = 1;
        }

        let learners = resolve_learners(kind, run.mode, run.learners);
        if learners != run.learners {
            log::info!(
                "{kind} in {:?} mode runs with {learners} learners ({} requested)",
                run.mode,
                run.learners
            );
            run.learners = learners;
        }

        let rates = exploration_rates(run.mode, run.exploration, run.rl.eps, run.actors);
        let offsets = start_offsets(run.mode, run.sim_len, run.offset, run.actors);
        Ok(Self {
            run: Arc::new(run),
            kind,
            sims,
            nets,
            rates,
            offsets,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.run
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn exploration_rates(&self) -> &[f32] {
        &self.rates
    }

    pub fn start_offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Build one simulation to read the intersection layout, then close it.
    pub fn discover_topology(&self) -> Result<Topology> {
        let mut sim = self.sims.build(None)?;
        let topology = sim.topology().clone();
        sim.close()?;
        if topology.is_empty() {
            return Err(TscError::Simulation("simulation has no intersections".into()));
        }
        Ok(topology)
    }

    /// Spawn every worker and block until all of them have returned.
    pub fn run(self) -> Result<RunSummary> {
        let start = Instant::now();
        let n = self.run.actors;
        let l = self.run.learners;

        let topology = Arc::new(self.discover_topology()?);
        let shared = Arc::new(SharedState::new(
            topology.ids(),
            self.run.replay_capacity(),
            n + l,
            l,
        ));
        log::info!(
            "starting {} run: {n} actors, {l} learners, {} intersections",
            self.kind,
            topology.len()
        );

        let mut learners = Vec::with_capacity(l);
        for j in 0..l {
            let config = LearnerConfig::new(j)
                .with_save_interval(Duration::from_secs(self.run.io.save_interval_secs.max(1)));
            let worker = LearnerWorker::new(
                config,
                self.run.clone(),
                shared.clone(),
                topology.clone(),
                self.nets.clone(),
            )?;
            learners.push(worker.spawn()?);
        }

        let (tx, rx) = unbounded();
        let mut actors = Vec::with_capacity(n);
        for (i, (&eps, &offset)) in self.rates.iter().zip(&self.offsets).enumerate() {
            let config = ActorConfig::new(i).with_epsilon(eps).with_offset(offset);
            log::debug!("actor {i}: eps {eps}, offset {offset}");
            let worker = ActorWorker::new(
                config,
                self.run.clone(),
                shared.clone(),
                self.sims.clone(),
                self.nets.clone(),
                tx.clone(),
            )?;
            actors.push(worker.spawn()?);
        }
        drop(tx);

        let mut summary = RunSummary {
            controller: self.kind.as_str().to_string(),
            actors: n,
            learners: l,
            ..Default::default()
        };
        // ends once every actor has dropped its sender
        for report in rx.iter() {
            match report {
                ActorReport::EpisodeFinished(e) => {
                    log::info!(
                        "actor {} episode {} (eps {}): {} trips, travel time {:.1} +/- {:.1}",
                        e.actor,
                        e.episode,
                        e.epsilon,
                        e.vehicles,
                        e.mean_travel_time,
                        e.std_travel_time
                    );
                    summary.episodes.push(e);
                }
                ActorReport::Finished { actor, episodes } => {
                    summary.actor_episodes.insert(actor, episodes);
                }
            }
        }

        let mut first_err = None;
        for handle in actors {
            if let Err(e) = handle.join() {
                first_err.get_or_insert(e);
            }
        }
        for handle in learners {
            match handle.join() {
                Ok(stats) => summary.learner_stats.push(stats),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        summary.wall_secs = start.elapsed().as_secs_f64();
        log::info!("{} run finished in {:.1}s", self.kind, summary.wall_secs);
        Ok(summary)
    }
}
