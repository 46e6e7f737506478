//! Discrete RL control: the agent picks the next green, held for `g_min`.

use super::{rl_state, PendingDecision, PhaseView, SignalPolicy, SignalState};
use crate::agents::Agent;
use crate::config::SignalTiming;
use crate::core::Action;
use crate::error::{Result, TscError};

pub struct NextPhaseRl {
    agent: Agent,
    green_t: u64,
    pending: Option<PendingDecision>,
    /// Set after one extra all-red hold when traffic reappears.
    delayed_green: bool,
}

impl NextPhaseRl {
    pub fn new(timing: &SignalTiming, agent: Agent) -> Self {
        Self {
            agent,
            green_t: u64::from(timing.g_min),
            pending: None,
            delayed_green: false,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn is_acting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn into_agent(self) -> Agent {
        self.agent
    }
}

impl SignalPolicy for NextPhaseRl {
    fn next_phase(&mut self, view: &PhaseView<'_>) -> Result<SignalState> {
        if view.obs.is_empty() {
            if let Some(decision) = self.pending.take() {
                let state = rl_state(view.layout, view.obs, view.current);
                decision.complete(&mut self.agent, state, view.reward, true);
            }
            return Ok(SignalState::AllRed);
        }

        // Let arrivals build up for one all-red period before acting.
        if view.current == SignalState::AllRed && !self.delayed_green {
            self.delayed_green = true;
            self.pending = None;
            return Ok(SignalState::AllRed);
        }
        self.delayed_green = false;

        let state = rl_state(view.layout, view.obs, view.current);
        if let Some(decision) = self.pending.take() {
            decision.complete(&mut self.agent, state.clone(), view.reward, false);
        }

        let action = self.agent.get_action(&state)?;
        let phase = action
            .as_discrete()
            .filter(|&a| a < view.layout.n_greens())
            .ok_or_else(|| TscError::network(format!("invalid phase action {action:?}")))?;
        self.pending = Some(PendingDecision {
            state,
            action: Action::Discrete(phase),
        });
        Ok(SignalState::Green(phase))
    }

    fn green_duration(&self, _phase: usize) -> u64 {
        self.green_t
    }
}
