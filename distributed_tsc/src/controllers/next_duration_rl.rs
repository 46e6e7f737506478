//! Continuous RL control: greens cycle in order, skipping phases with no
//! waiting vehicles, and the agent sets each green's duration.

use super::{rl_state, PendingDecision, PhaseView, SignalPolicy, SignalState};
use crate::agents::Agent;
use crate::config::SignalTiming;
use crate::environment::{IntersectionLayout, IntersectionObservation};
use crate::error::Result;

pub struct NextDurationRl {
    agent: Agent,
    n_greens: usize,
    cursor: usize,
    g_min: u64,
    g_max: u64,
    mid: f32,
    interval: f32,
    duration: u64,
    pending: Option<PendingDecision>,
}

/// Map a policy output in [-1, 1] to a green duration in `[g_min, g_max]`.
pub fn duration_from_action(action: f32, g_min: u64, g_max: u64) -> u64 {
    let (lo, hi) = (g_min as f32, g_max.max(g_min) as f32);
    let mid = (hi - lo) / 2.0 + lo;
    let interval = hi - mid;
    let t = (action * interval + mid) as i64;
    t.clamp(g_min as i64, g_max.max(g_min) as i64) as u64
}

fn phase_has_vehicles(layout: &IntersectionLayout, obs: &IntersectionObservation, phase: usize) -> bool {
    layout
        .phases
        .get(phase)
        .map(|p| p.incoming.iter().any(|&l| obs.incoming_count(l) > 0))
        .unwrap_or(false)
}

impl NextDurationRl {
    pub fn new(layout: &IntersectionLayout, timing: &SignalTiming, agent: Agent) -> Self {
        let g_min = u64::from(timing.g_min);
        let g_max = u64::from(timing.g_max).max(g_min);
        let mid = (g_max - g_min) as f32 / 2.0 + g_min as f32;
        Self {
            agent,
            n_greens: layout.n_greens().max(1),
            cursor: 0,
            g_min,
            g_max,
            mid,
            interval: g_max as f32 - mid,
            duration: g_min,
            pending: None,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Midpoint and half-width of the duration range.
    pub fn duration_range(&self) -> (f32, f32) {
        (self.mid, self.interval)
    }

    pub fn into_agent(self) -> Agent {
        self.agent
    }
}

impl SignalPolicy for NextDurationRl {
    fn next_phase(&mut self, view: &PhaseView<'_>) -> Result<SignalState> {
        for _ in 0..self.n_greens {
            let phase = self.cursor;
            self.cursor = (self.cursor + 1) % self.n_greens;
            if !phase_has_vehicles(view.layout, view.obs, phase) {
                continue;
            }

            let state = rl_state(view.layout, view.obs, SignalState::Green(phase));
            if let Some(decision) = self.pending.take() {
                decision.complete(&mut self.agent, state.clone(), view.reward, false);
            }
            let action = self.agent.get_action(&state)?;
            let a = action.as_continuous().and_then(|v| v.first().copied()).unwrap_or(0.0);
            self.duration = duration_from_action(a, self.g_min, self.g_max);
            self.pending = Some(PendingDecision { state, action });
            return Ok(SignalState::Green(phase));
        }

        if let Some(decision) = self.pending.take() {
            let state = rl_state(view.layout, view.obs, SignalState::AllRed);
            decision.complete(&mut self.agent, state, view.reward, true);
        }
        Ok(SignalState::AllRed)
    }

    fn green_duration(&self, _phase: usize) -> u64 {
        self.duration
    }
}
