//! Signal states and the transition rules shared by every controller.

use crate::config::SignalTiming;
use crate::environment::{IntersectionLayout, IntersectionObservation};
use serde::{Deserialize, Serialize};

/// Speed under which a vehicle counts as queued, in metres per tick.
pub const STOP_SPEED: f32 = 0.3;

/// Displayed state of one intersection's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalState {
    /// Green phase by index into the layout's phases.
    Green(usize),
    /// Clearance after green phase `usize`.
    Yellow(usize),
    AllRed,
}

impl SignalState {
    pub fn is_green(self) -> bool {
        matches!(self, SignalState::Green(_))
    }

    pub fn green_index(self) -> Option<usize> {
        match self {
            SignalState::Green(g) => Some(g),
            _ => None,
        }
    }
}

/// States interposed when moving from `current` to `next`.
///
/// Leaving a green always passes through its yellow, then all-red unless all-red
/// is itself the destination. Nothing is interposed when the state is
/// unchanged or when leaving all-red.
pub fn intermediate_states(current: SignalState, next: SignalState) -> Vec<SignalState> {
    if current == next {
        return Vec::new();
    }
    match current {
        SignalState::AllRed => Vec::new(),
        SignalState::Green(g) if next == SignalState::AllRed => vec![SignalState::Yellow(g)],
        SignalState::Green(g) => vec![SignalState::Yellow(g), SignalState::AllRed],
        SignalState::Yellow(_) if next == SignalState::AllRed => Vec::new(),
        SignalState::Yellow(_) => vec![SignalState::AllRed],
    }
}

/// Ticks to hold `state`. Green durations come from the controller variant.
pub fn phase_duration(
    state: SignalState,
    timing: &SignalTiming,
    green: impl FnOnce(usize) -> u64,
) -> u64 {
    match state {
        SignalState::Green(g) => green(g),
        SignalState::Yellow(_) => u64::from(timing.yellow),
        SignalState::AllRed => u64::from(timing.red),
    }
}

/// One-hot over `n_greens` greens followed by all-red. Yellow maps onto its
/// green.
pub fn phase_one_hot(state: SignalState, n_greens: usize) -> Vec<f32> {
    let mut v = vec![0.0; n_greens + 1];
    let idx = match state {
        SignalState::Green(g) | SignalState::Yellow(g) => g.min(n_greens),
        SignalState::AllRed => n_greens,
    };
    v[idx] = 1.0;
    v
}

/// Density then queue of each incoming lane, normalised by lane capacity.
pub fn lane_state(layout: &IntersectionLayout, obs: &IntersectionObservation) -> Vec<f32> {
    let n = layout.incoming.len();
    let mut state = Vec::with_capacity(2 * n);
    for (i, lane) in layout.incoming.iter().enumerate() {
        state.push(obs.incoming_count(i) as f32 / lane.capacity());
    }
    for (i, lane) in layout.incoming.iter().enumerate() {
        let queued = obs.incoming.get(i).map(|l| l.queued(STOP_SPEED)).unwrap_or(0);
        state.push(queued as f32 / lane.capacity());
    }
    state
}

/// Full RL state: lane state followed by the phase one-hot.
pub fn rl_state(
    layout: &IntersectionLayout,
    obs: &IntersectionObservation,
    phase: SignalState,
) -> Vec<f32> {
    let mut state = lane_state(layout, obs);
    state.extend(phase_one_hot(phase, layout.n_greens()));
    state
}
