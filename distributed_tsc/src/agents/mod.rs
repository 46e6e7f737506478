//! Learning agents.
//!
//! An [`Agent`] wraps the networks of one intersection together with its
//! shared replay and stats. The same type serves both sides of a run:
//!
//! - actor side: `get_action` and `store_experience`, networks without
//!   target copies, online weights pulled from [`AgentStats`] by version;
//! - learner side: `train_batch` and `clip_exp_replay`, networks with target
//!   copies (and a critic for continuous agents), weights published after
//!   every step.
//!
//! [`AgentStats`]: crate::core::AgentStats

mod ddpg;
mod dqn;

pub use ddpg::DdpgAgent;
pub use dqn::DqnAgent;

use crate::checkpoint::Checkpointer;
use crate::config::RunConfig;
use crate::core::{
    Action, AgentId, AgentShared, Experience, NetRole, SharedAgentStats, SharedReplay, Trajectory,
    WeightKey,
};
use crate::error::Result;
use crate::nn::AgentNetworks;
use std::sync::Arc;

/// Action space of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Chooses the next green phase.
    Discrete,
    /// Chooses the next green duration.
    Continuous,
}

impl AgentKind {
    /// Policy output width for an intersection with `n_greens` green phases.
    pub fn output_dim(self, n_greens: usize) -> usize {
        match self {
            AgentKind::Discrete => n_greens,
            AgentKind::Continuous => 1,
        }
    }
}

/// Learning hyperparameters of an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub n_steps: usize,
    pub batch_size: usize,
    pub gamma: f32,
    pub total_updates: u64,
    pub tau: f32,
    /// Actor-side instances record experience only in train mode.
    pub train: bool,
}

impl AgentConfig {
    pub fn from_run(config: &RunConfig) -> Self {
        Self {
            n_steps: config.rl.n_steps.max(1),
            batch_size: config.rl.batch_size.max(1),
            gamma: config.rl.gamma,
            total_updates: config.rl.updates,
            tau: config.rl.tau,
            train: config.mode.is_train(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_run(&RunConfig::default())
    }
}

/// State shared by both agent variants: trajectory building, sampling and
/// counter bookkeeping.
pub(crate) struct AgentCore {
    id: AgentId,
    replay: SharedReplay,
    stats: SharedAgentStats,
    config: AgentConfig,
    epsilon: f32,
    trajectory: Trajectory,
    /// Version of the online weights last pulled from stats.
    held_version: u64,
}

impl AgentCore {
    fn new(id: AgentId, shared: &AgentShared, config: AgentConfig, epsilon: f32) -> Self {
        Self {
            id,
            replay: Arc::clone(&shared.replay),
            stats: Arc::clone(&shared.stats),
            trajectory: Trajectory::with_capacity(config.n_steps),
            config,
            epsilon,
            held_version: 0,
        }
    }

    /// Exploration rate for the next action. Train-mode agents explore fully
    /// until their replay first reaches capacity.
    fn effective_epsilon(&self) -> f32 {
        if self.config.train && !self.replay.is_full() {
            1.0
        } else {
            self.epsilon
        }
    }

    fn store(&mut self, exp: Experience) -> bool {
        if !self.config.train || self.stats.updates() >= self.config.total_updates {
            return false;
        }
        self.stats.observe_reward(exp.reward);

        let terminal = exp.terminal;
        self.trajectory.push(exp);
        if self.trajectory.len() >= self.config.n_steps || terminal {
            let full = std::mem::replace(
                &mut self.trajectory,
                Trajectory::with_capacity(self.config.n_steps),
            );
            self.replay.append(full);
            return true;
        }
        false
    }

    /// Newer published online weights, if any.
    fn newer_online_weights(&self) -> Option<crate::core::WeightMessage> {
        if !self.config.train {
            return None;
        }
        self.stats
            .weights_newer_than(WeightKey::POLICY_ONLINE, self.held_version)
    }

    /// Bookkeeping after one gradient step. Returns the new update count.
    fn finish_update(&self) -> u64 {
        self.stats.decrement_available_experience();
        self.stats.increment_updates()
    }

    fn target_sync_due(&self, updates: u64, period: u64) -> bool {
        period > 0 && updates % period == 0
    }
}

/// Per-step training samples drawn from a batch of trajectories.
pub(crate) struct StepBatch<A> {
    pub states: Vec<Vec<f32>>,
    pub actions: Vec<A>,
    pub returns: Vec<f32>,
}

impl<A> StepBatch<A> {
    fn with_capacity(n: usize) -> Self {
        Self {
            states: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            returns: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, state: Vec<f32>, action: A, ret: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.returns.push(ret);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Keep a uniform random subset of at most `size` steps.
    fn subsample(self, size: usize) -> Self {
        if self.len() <= size {
            return self;
        }
        let mut idx: Vec<usize> = (0..self.len()).collect();
        fastrand::shuffle(&mut idx);
        idx.truncate(size);

        let mut states: Vec<Option<Vec<f32>>> = self.states.into_iter().map(Some).collect();
        let mut actions: Vec<Option<A>> = self.actions.into_iter().map(Some).collect();
        let mut out = StepBatch::with_capacity(size);
        for i in idx {
            if let (Some(s), Some(a)) = (states[i].take(), actions[i].take()) {
                out.push(s, a, self.returns[i]);
            }
        }
        out
    }
}

/// Expand trajectories into per-step n-step targets.
///
/// `bootstrap[i]` is the value estimate of trajectory `i`'s final next-state;
/// terminal trajectories bootstrap from zero.
pub(crate) fn build_step_batch<A>(
    batch: &[Arc<Trajectory>],
    bootstrap: &[f32],
    gamma: f32,
    scale: f32,
    action: impl Fn(&Action) -> Option<A>,
) -> StepBatch<A> {
    let mut out = StepBatch::with_capacity(batch.iter().map(|t| t.len()).sum());
    for (traj, &boot) in batch.iter().zip(bootstrap) {
        let boot = if traj.is_terminal() { 0.0 } else { boot };
        let returns = traj.discounted_returns(boot, gamma, scale);
        for (exp, ret) in traj.steps().iter().zip(returns) {
            if let Some(a) = action(&exp.action) {
                out.push(exp.state.clone(), a, ret);
            }
        }
    }
    out
}

/// Final next-state of each non-empty trajectory, with the trajectories kept.
pub(crate) fn final_next_states(batch: Vec<Arc<Trajectory>>) -> (Vec<Arc<Trajectory>>, Vec<Vec<f32>>) {
    batch
        .into_iter()
        .filter_map(|t| {
            let next = t.last()?.next_state.clone();
            Some((t, next))
        })
        .unzip()
}

/// A learning agent of either action space.
pub enum Agent {
    Discrete(DqnAgent),
    Continuous(DdpgAgent),
}

impl Agent {
    /// Wrap `networks` for agent `id`.
    ///
    /// `n_actions` is the number of green phases (ignored by continuous agents).
    pub fn new(
        id: AgentId,
        networks: AgentNetworks,
        shared: &AgentShared,
        config: AgentConfig,
        epsilon: f32,
        n_actions: usize,
    ) -> Self {
        let core = AgentCore::new(id, shared, config, epsilon);
        match networks {
            AgentNetworks::Discrete { q } => Agent::Discrete(DqnAgent::new(core, q, n_actions)),
            AgentNetworks::Continuous { policy, critic } => {
                Agent::Continuous(DdpgAgent::new(core, policy, critic))
            }
        }
    }

    fn core(&self) -> &AgentCore {
        match self {
            Agent::Discrete(a) => &a.core,
            Agent::Continuous(a) => &a.core,
        }
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        match self {
            Agent::Discrete(a) => &mut a.core,
            Agent::Continuous(a) => &mut a.core,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.core().id
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::Discrete(_) => AgentKind::Discrete,
            Agent::Continuous(_) => AgentKind::Continuous,
        }
    }

    pub fn epsilon(&self) -> f32 {
        self.core().epsilon
    }

    /// Exploration rate the next `get_action` will use.
    pub fn effective_epsilon(&self) -> f32 {
        self.core().effective_epsilon()
    }

    pub fn get_action(&mut self, state: &[f32]) -> Result<Action> {
        match self {
            Agent::Discrete(a) => a.get_action(state),
            Agent::Continuous(a) => a.get_action(state),
        }
    }

    /// Record one decision interval. Returns true when a trajectory was
    /// flushed to the replay.
    pub fn store_experience(
        &mut self,
        state: Vec<f32>,
        action: Action,
        next_state: Vec<f32>,
        reward: f32,
        terminal: bool,
    ) -> bool {
        self.core_mut()
            .store(Experience::new(state, action, next_state, reward, terminal))
    }

    /// One training step. `None` when the replay is empty.
    pub fn train_batch(&mut self, target_update_period: u64) -> Result<Option<f32>> {
        match self {
            Agent::Discrete(a) => a.train_batch(target_update_period),
            Agent::Continuous(a) => a.train_batch(target_update_period),
        }
    }

    /// Evict replay entries above capacity. Returns how many were removed.
    pub fn clip_exp_replay(&self) -> usize {
        self.core().replay.trim()
    }

    /// Write every network of this agent, target copies included.
    pub fn save_weights(&self, checkpointer: &Checkpointer) -> Result<()> {
        let id = self.id();
        match self {
            Agent::Discrete(a) => checkpointer.save_net(id, "q", a.q.as_ref()),
            Agent::Continuous(a) => {
                checkpointer.save_net(id, "policy", a.policy.as_ref())?;
                if let Some(critic) = &a.critic {
                    checkpointer.save_net(id, "critic", critic.as_ref())?;
                }
                Ok(())
            }
        }
    }

    /// Give the networks back (actors reuse them across episodes).
    pub fn into_networks(self) -> AgentNetworks {
        match self {
            Agent::Discrete(a) => a.into_networks(),
            Agent::Continuous(a) => a.into_networks(),
        }
    }
}

/// Learner startup: sync targets to online and publish the online weights.
pub fn distribute_weights(networks: &mut AgentNetworks, stats: &SharedAgentStats) -> Result<()> {
    match networks {
        AgentNetworks::Discrete { q } => {
            if q.has_target() {
                q.transfer_weights()?;
                stats.publish_weights(WeightKey::POLICY_TARGET, q.get_weights(NetRole::Target)?);
            }
            stats.publish_weights(WeightKey::POLICY_ONLINE, q.get_weights(NetRole::Online)?);
        }
        AgentNetworks::Continuous { policy, critic } => {
            if policy.has_target() {
                policy.soft_update(1.0)?;
            }
            stats.publish_weights(WeightKey::POLICY_ONLINE, policy.get_weights(NetRole::Online)?);
            if let Some(critic) = critic {
                critic.soft_update(1.0)?;
                stats.publish_weights(WeightKey::CRITIC_ONLINE, critic.get_weights(NetRole::Online)?);
            }
        }
    }
    Ok(())
}

/// Actor startup: load the latest published online weights.
///
/// Returns the version loaded, or `None` if nothing was published.
pub fn pull_online_weights(networks: &mut AgentNetworks, stats: &SharedAgentStats) -> Result<Option<u64>> {
    let Some(msg) = stats.weights(WeightKey::POLICY_ONLINE) else {
        return Ok(None);
    };
    match networks {
        AgentNetworks::Discrete { q } => q.set_weights(&msg.payload, NetRole::Online)?,
        AgentNetworks::Continuous { policy, .. } => policy.set_weights(&msg.payload, NetRole::Online)?,
    }
    Ok(Some(msg.version))
}
