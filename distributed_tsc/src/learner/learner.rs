//! Learner worker: trains the agents it owns from their shared replays.
//!
//! # Training loop
//!
//! ```text
//! while any owned agent is short of its updates:
//!     for each owned agent:
//!         credit newly appended trajectories as available experience
//!         if replay is full:
//!             first time: save replay (optional), available = replay length
//!             if updates < total and available > 0:
//!                 train min(available, batches_per_round, total - updates) batches
//!                 trim replay to capacity
//!     every 90 s: log counters
//!     every save interval: save weights (optional), progress row (learner 0)
//! ```
//!
//! Learner 0 keeps writing progress rows after its own agents are done until
//! every agent of the run has finished.

use crate::agents::{distribute_weights, Agent, AgentConfig};
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::RunConfig;
use crate::controllers::ControllerKind;
use crate::core::{AgentId, SharedState};
use crate::environment::Topology;
use crate::error::{Result, TscError};
use crate::metrics::ProgressWriter;
use crate::nn::{AgentNetworks, NetworkDims, NetworkFactory};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Learner configuration.
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    pub learner_id: usize,
    /// Interval between counter log lines.
    pub log_interval: Duration,
    /// Interval between weight saves and progress rows.
    pub save_interval: Duration,
    /// Poll period while waiting on other learners.
    pub idle_poll: Duration,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            learner_id: 0,
            log_interval: Duration::from_secs(90),
            save_interval: Duration::from_secs(120),
            idle_poll: Duration::from_millis(50),
        }
    }
}

impl LearnerConfig {
    pub fn new(learner_id: usize) -> Self {
        Self {
            learner_id,
            ..Default::default()
        }
    }

    pub fn with_log_interval(mut self, interval: Duration) -> Self {
        self.log_interval = interval;
        self
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_idle_poll(mut self, poll: Duration) -> Self {
        self.idle_poll = poll;
        self
    }

    /// Learner 0 writes the run's progress CSVs.
    pub fn writes_progress(&self) -> bool {
        self.learner_id == 0
    }

    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.save_interval.is_zero() {
            return Err("save_interval must be > 0");
        }
        if self.idle_poll.is_zero() {
            return Err("idle_poll must be > 0");
        }
        Ok(())
    }
}

/// Counters after a learner returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnerStats {
    pub learner_id: usize,
    /// Agent id -> updates reached.
    pub updates: BTreeMap<AgentId, u64>,
    /// Training steps taken by this learner.
    pub train_steps: u64,
    /// Mean loss over the last round, when any training happened.
    pub last_loss: Option<f32>,
}

/// Handle to a spawned learner thread.
pub struct LearnerHandle {
    pub thread: JoinHandle<Result<LearnerStats>>,
    name: String,
}

impl LearnerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Wait for the learner. A panic becomes [`TscError::WorkerPanicked`].
    pub fn join(self) -> Result<LearnerStats> {
        self.thread
            .join()
            .map_err(|_| TscError::WorkerPanicked(self.name))?
    }
}

/// Per-agent bookkeeping local to the owning learner.
pub(super) struct Owned {
    agent: Agent,
    /// `total_appended` already credited as available experience.
    credited: u64,
}

/// One learner worker, ready to run on its own thread.
pub struct LearnerWorker {
    config: LearnerConfig,
    run: Arc<RunConfig>,
    kind: ControllerKind,
    shared: Arc<SharedState>,
    topology: Arc<Topology>,
    nets: Arc<dyn NetworkFactory>,
    checkpointer: Checkpointer,
}

impl LearnerWorker {
    /// Fails unless the run's controller is a learning variant.
    pub fn new(
        config: LearnerConfig,
        run: Arc<RunConfig>,
        shared: Arc<SharedState>,
        topology: Arc<Topology>,
        nets: Arc<dyn NetworkFactory>,
    ) -> Result<Self> {
        config.validate().map_err(TscError::config)?;
        let kind: ControllerKind = run.controller.parse()?;
        if !kind.is_learning() {
            return Err(TscError::config(format!("{kind} controller has no learner")));
        }
        let checkpointer = Checkpointer::new(CheckpointerConfig::new(&run.io.save_path, kind.as_str()));
        Ok(Self {
            config,
            run,
            kind,
            shared,
            topology,
            nets,
            checkpointer,
        })
    }

    pub fn thread_name(&self) -> String {
        format!("tsc-learner-{}", self.config.learner_id)
    }

    /// Run [`run`](Self::run) on a named thread.
    pub fn spawn(self) -> Result<LearnerHandle> {
        let name = self.thread_name();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let id = self.config.learner_id;
                let result = self.run();
                if let Err(e) = &result {
                    log::error!("learner {id} failed: {e}");
                }
                result
            })?;
        Ok(LearnerHandle { thread, name })
    }

    /// Full learner lifecycle. Blocks on the shared barrier twice.
    pub fn run(self) -> Result<LearnerStats> {
        let idx = self.config.learner_id;
        let ids = self.shared.agents_for_learner(idx);
        let total = self.run.rl.updates;

        let mut networks = self.build_networks(&ids)?;
        log::info!("learner {idx} published weights of {} agents, waiting at barrier", ids.len());
        self.shared.barrier().wait();

        if self.run.io.load_replay {
            for id in &ids {
                if let Some(shared) = self.shared.agent(id) {
                    self.checkpointer.load_replay(id, &shared.replay, &shared.stats)?;
                }
            }
        }
        let mut owned = self.build_agents(&mut networks)?;
        log::info!("learner {idx} built agents, waiting at offset barrier");
        self.shared.barrier().wait();

        let mut progress = if self.config.writes_progress() {
            Some(ProgressWriter::create(
                &self.run.io.progress_dir,
                self.kind.as_str(),
                self.shared.agent_ids(),
            )?)
        } else {
            None
        };

        let mut primed: HashSet<AgentId> = HashSet::new();
        let mut stats = LearnerStats {
            learner_id: idx,
            ..Default::default()
        };
        let mut last_log = Instant::now();
        let mut last_save = Instant::now();

        while !self.shared.updates_reached(&ids, total) {
            let mut losses = Vec::new();
            let mut trained = false;
            for o in owned.iter_mut() {
                let steps = self.train_agent(o, &mut primed, &mut losses)?;
                stats.train_steps += steps;
                trained |= steps > 0;
            }
            if !losses.is_empty() {
                stats.last_loss = Some(losses.iter().sum::<f32>() / losses.len() as f32);
            }

            if last_log.elapsed() >= self.config.log_interval {
                last_log = Instant::now();
                self.log_counters(&ids);
            }
            if last_save.elapsed() >= self.config.save_interval {
                last_save = Instant::now();
                if self.run.io.save {
                    self.save_weights(&owned)?;
                }
                if let Some(p) = progress.as_mut() {
                    p.write_row(&self.shared)?;
                }
            }
            if !trained {
                // nothing to do until actors fill the replays
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        log::info!("learner {idx} finished its training loop");

        if let Some(p) = progress.as_mut() {
            while !self.shared.all_updates_reached(total) {
                if last_save.elapsed() >= self.config.save_interval {
                    last_save = Instant::now();
                    p.write_row(&self.shared)?;
                }
                std::thread::sleep(self.config.idle_poll);
            }
            p.write_row(&self.shared)?;
        }

        if self.run.io.save {
            self.save_weights(&owned)?;
        }
        self.log_counters(&ids);

        for id in &ids {
            if let Some(s) = self.shared.stats(id) {
                stats.updates.insert(id.clone(), s.updates());
            }
        }
        Ok(stats)
    }

    /// Build learner-side networks, load checkpoints when asked, publish the
    /// initial online weights.
    pub(super) fn build_networks(&self, ids: &[AgentId]) -> Result<BTreeMap<AgentId, AgentNetworks>> {
        let kind = self
            .kind
            .agent_kind()
            .ok_or_else(|| TscError::config(format!("{} has no agent", self.kind)))?;
        let mut networks = BTreeMap::new();
        for id in ids {
            let layout = self
                .topology
                .get(id)
                .ok_or_else(|| TscError::config(format!("agent {id} not in topology")))?;
            let stats = self
                .shared
                .stats(id)
                .ok_or_else(|| TscError::config(format!("no shared stats for agent {id}")))?;
            let dims = NetworkDims::new(layout.state_dim(), kind.output_dim(layout.n_greens()));
            let mut nets = self.nets.build(kind, dims, true);
            if self.run.io.load {
                self.checkpointer.load_networks(id, &mut nets)?;
            }
            distribute_weights(&mut nets, stats)?;
            networks.insert(id.clone(), nets);
        }
        Ok(networks)
    }

    pub(super) fn build_agents(&self, networks: &mut BTreeMap<AgentId, AgentNetworks>) -> Result<Vec<Owned>> {
        let config = AgentConfig::from_run(&self.run);
        let mut owned = Vec::with_capacity(networks.len());
        for (id, nets) in std::mem::take(networks) {
            let shared = self
                .shared
                .agent(&id)
                .ok_or_else(|| TscError::config(format!("no shared state for agent {id}")))?;
            let n_greens = self.topology.get(&id).map_or(0, |l| l.n_greens());
            let credited = shared.replay.total_appended();
            let agent = Agent::new(id, nets, shared, config.clone(), self.run.rl.eps, n_greens);
            owned.push(Owned { agent, credited });
        }
        Ok(owned)
    }

    /// One round for one agent. Returns the number of training steps taken.
    pub(super) fn train_agent(
        &self,
        o: &mut Owned,
        primed: &mut HashSet<AgentId>,
        losses: &mut Vec<f32>,
    ) -> Result<u64> {
        let id = o.agent.id().clone();
        let Some(shared) = self.shared.agent(&id) else {
            return Ok(0);
        };
        let appended = shared.replay.total_appended();
        if appended > o.credited {
            shared.stats.add_available_experience(appended - o.credited);
            o.credited = appended;
        }
        if !shared.replay.is_full() {
            return Ok(0);
        }

        if shared.stats.updates() == 0 && primed.insert(id.clone()) {
            if self.run.io.save_replay {
                self.checkpointer.save_replay(&id, &shared.replay)?;
            }
            shared.stats.reset_available_experience(shared.replay.len());
            log::info!("agent {id} replay full, beginning batch updates");
        }

        let remaining = self.run.rl.updates.saturating_sub(shared.stats.updates());
        let available = shared.stats.available_experience();
        if remaining == 0 || available <= 0 {
            return Ok(0);
        }
        // never past the update budget
        let batches = (available as usize)
            .min(self.run.rl.batches_per_round)
            .min(remaining as usize);
        let mut steps = 0;
        for _ in 0..batches {
            if let Some(loss) = o.agent.train_batch(self.run.rl.target_freq)? {
                losses.push(loss);
                steps += 1;
            }
        }
        o.agent.clip_exp_replay();
        Ok(steps)
    }

    fn save_weights(&self, owned: &[Owned]) -> Result<()> {
        for o in owned {
            o.agent.save_weights(&self.checkpointer)?;
        }
        log::debug!("learner {} saved weights of {} agents", self.config.learner_id, owned.len());
        Ok(())
    }

    fn log_counters(&self, ids: &[AgentId]) {
        for id in ids {
            if let Some(s) = self.shared.agent(id) {
                log::info!(
                    "learner {} agent {id}: updates {} available {} replay {}",
                    self.config.learner_id,
                    s.stats.updates(),
                    s.stats.available_experience(),
                    s.replay.len()
                );
            }
        }
    }
}
