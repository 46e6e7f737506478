//! Traffic-signal controllers.
//!
//! Every variant shares one state machine, held in [`Controller`]:
//!
//! ```text
//!            ┌──────────── next_phase() == current ───────────┐
//!            ▼                                                │
//! AllRed ─► Green(g) ── remaining == 0 ─► Yellow(g) ─► AllRed ─► Green(h)
//! ```
//!
//! Each tick the controller feeds the observation to its policy, and once
//! the current state's time runs out it pops the next queued state or asks
//! the policy for a new target, interposing yellow and all-red between two
//! distinct greens. The policies only choose targets and green durations.

pub mod max_pressure;
pub mod metrics;
pub mod next_duration_rl;
pub mod next_phase_rl;
pub mod phase;
pub mod sotl;
pub mod uniform;
pub mod webster;

pub use max_pressure::MaxPressure;
pub use metrics::{MetricHistory, TrafficMetrics};
pub use next_duration_rl::NextDurationRl;
pub use next_phase_rl::NextPhaseRl;
pub use phase::{intermediate_states, phase_duration, phase_one_hot, rl_state, SignalState};
pub use sotl::Sotl;
pub use uniform::UniformCycle;
pub use webster::{webster_timings, Webster};

use crate::agents::{Agent, AgentKind};
use crate::config::{RunConfig, SignalTiming};
use crate::core::{Action, AgentId};
use crate::environment::{IntersectionLayout, IntersectionObservation};
use crate::error::{Result, TscError};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Controller variant, parsed from its command-line name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Uniform,
    Webster,
    MaxPressure,
    Sotl,
    Dqn,
    Ddpg,
}

impl ControllerKind {
    pub const ALL: [ControllerKind; 6] = [
        ControllerKind::Uniform,
        ControllerKind::Webster,
        ControllerKind::MaxPressure,
        ControllerKind::Sotl,
        ControllerKind::Dqn,
        ControllerKind::Ddpg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControllerKind::Uniform => "uniform",
            ControllerKind::Webster => "websters",
            ControllerKind::MaxPressure => "maxpressure",
            ControllerKind::Sotl => "sotl",
            ControllerKind::Dqn => "dqn",
            ControllerKind::Ddpg => "ddpg",
        }
    }

    /// Whether the variant is driven by an agent.
    pub fn is_learning(self) -> bool {
        self.agent_kind().is_some()
    }

    pub fn agent_kind(self) -> Option<AgentKind> {
        match self {
            ControllerKind::Dqn => Some(AgentKind::Discrete),
            ControllerKind::Ddpg => Some(AgentKind::Continuous),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControllerKind {
    type Err = TscError;

    fn from_str(s: &str) -> Result<Self> {
        ControllerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TscError::config(format!("unknown controller type '{s}'")))
    }
}

/// What a policy sees at each tick.
pub struct PhaseView<'a> {
    pub layout: &'a IntersectionLayout,
    pub obs: &'a IntersectionObservation,
    pub current: SignalState,
    /// Ticks the current state has been held, this one included.
    pub time_in_state: u64,
    /// Reward accrued at this tick (negated delay).
    pub reward: f32,
}

/// Decision logic of one controller variant.
pub trait SignalPolicy {
    /// Observe one tick. Called before any decision on that tick.
    fn update(&mut self, _view: &PhaseView<'_>) {}

    /// Target state once the current one expires and nothing is queued.
    fn next_phase(&mut self, view: &PhaseView<'_>) -> Result<SignalState>;

    /// Ticks to hold green phase `phase`.
    fn green_duration(&self, phase: usize) -> u64;
}

/// A decision waiting for the state that follows it.
pub(crate) struct PendingDecision {
    pub state: Vec<f32>,
    pub action: Action,
}

impl PendingDecision {
    /// Hand the completed interval to the agent.
    pub fn complete(self, agent: &mut Agent, next_state: Vec<f32>, reward: f32, terminal: bool) {
        agent.store_experience(self.state, self.action, next_state, reward, terminal);
    }
}

/// Variant-specific state.
pub enum Policy {
    Uniform(UniformCycle),
    Webster(Webster),
    MaxPressure(MaxPressure),
    Sotl(Sotl),
    NextPhase(NextPhaseRl),
    NextDuration(NextDurationRl),
}

impl Policy {
    fn as_dyn(&self) -> &dyn SignalPolicy {
        match self {
            Policy::Uniform(p) => p,
            Policy::Webster(p) => p,
            Policy::MaxPressure(p) => p,
            Policy::Sotl(p) => p,
            Policy::NextPhase(p) => p,
            Policy::NextDuration(p) => p,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn SignalPolicy {
        match self {
            Policy::Uniform(p) => p,
            Policy::Webster(p) => p,
            Policy::MaxPressure(p) => p,
            Policy::Sotl(p) => p,
            Policy::NextPhase(p) => p,
            Policy::NextDuration(p) => p,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        match self {
            Policy::Uniform(_) => ControllerKind::Uniform,
            Policy::Webster(_) => ControllerKind::Webster,
            Policy::MaxPressure(_) => ControllerKind::MaxPressure,
            Policy::Sotl(_) => ControllerKind::Sotl,
            Policy::NextPhase(_) => ControllerKind::Dqn,
            Policy::NextDuration(_) => ControllerKind::Ddpg,
        }
    }
}

/// Signal controller of one intersection.
pub struct Controller {
    layout: IntersectionLayout,
    timing: SignalTiming,
    state: SignalState,
    remaining: u64,
    time_in_state: u64,
    pending: VecDeque<SignalState>,
    metrics: TrafficMetrics,
    policy: Policy,
}

impl Controller {
    /// Build a controller of `kind`. Learning variants take ownership of
    /// `agent` and fail without one.
    pub fn new(
        kind: ControllerKind,
        layout: IntersectionLayout,
        config: &RunConfig,
        agent: Option<Agent>,
    ) -> Result<Self> {
        if layout.n_greens() == 0 {
            return Err(TscError::Simulation(format!(
                "intersection {} has no green phases",
                layout.id
            )));
        }
        let timing = config.signal.clone();
        let missing_agent = || TscError::config(format!("{kind} controller needs an agent"));
        let policy = match kind {
            ControllerKind::Uniform => Policy::Uniform(UniformCycle::new(&layout, &timing)),
            ControllerKind::Webster => {
                Policy::Webster(Webster::new(&layout, &timing, config.webster.clone()))
            }
            ControllerKind::MaxPressure => Policy::MaxPressure(MaxPressure::new(&timing)),
            ControllerKind::Sotl => Policy::Sotl(Sotl::new(&layout, &timing, config.sotl.clone())),
            ControllerKind::Dqn => {
                Policy::NextPhase(NextPhaseRl::new(&timing, agent.ok_or_else(missing_agent)?))
            }
            ControllerKind::Ddpg => Policy::NextDuration(NextDurationRl::new(
                &layout,
                &timing,
                agent.ok_or_else(missing_agent)?,
            )),
        };

        Ok(Self {
            metrics: TrafficMetrics::new(&layout, !config.mode.is_train()),
            layout,
            timing,
            state: SignalState::AllRed,
            remaining: 0,
            time_in_state: 0,
            pending: VecDeque::new(),
            policy,
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.layout.id
    }

    pub fn kind(&self) -> ControllerKind {
        self.policy.kind()
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Ticks left in the current state.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn metrics(&self) -> &TrafficMetrics {
        &self.metrics
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Advance one tick. Returns the new signal state when it was (re)set.
    pub fn step(&mut self, obs: &IntersectionObservation) -> Result<Option<SignalState>> {
        self.metrics.update(obs);
        self.time_in_state += 1;

        let view = PhaseView {
            layout: &self.layout,
            obs,
            current: self.state,
            time_in_state: self.time_in_state,
            reward: self.metrics.reward(),
        };
        let policy = self.policy.as_dyn_mut();
        policy.update(&view);

        let mut changed = None;
        if self.remaining == 0 {
            let next = match self.pending.pop_front() {
                Some(next) => next,
                None => {
                    let target = policy.next_phase(&view)?;
                    self.pending.extend(intermediate_states(self.state, target));
                    self.pending.push_back(target);
                    self.pending.pop_front().unwrap_or(target)
                }
            };
            if next != self.state {
                self.time_in_state = 0;
            }
            self.state = next;
            let policy = self.policy.as_dyn();
            self.remaining = phase_duration(next, &self.timing, |g| policy.green_duration(g)).max(1);
            changed = Some(next);
        }
        self.remaining = self.remaining.saturating_sub(1);
        Ok(changed)
    }

    /// Per-tick histories (test mode only).
    pub fn take_history(&mut self) -> Option<MetricHistory> {
        self.metrics.take_history()
    }

    /// Release the agent of a learning controller.
    pub fn into_agent(self) -> Option<Agent> {
        match self.policy {
            Policy::NextPhase(p) => Some(p.into_agent()),
            Policy::NextDuration(p) => Some(p.into_agent()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests;
