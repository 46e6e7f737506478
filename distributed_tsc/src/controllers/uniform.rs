//! Fixed cycle: every green in layout order for `g_min` ticks.

use super::{PhaseView, SignalPolicy, SignalState};
use crate::config::SignalTiming;
use crate::environment::IntersectionLayout;
use crate::error::Result;

pub struct UniformCycle {
    n_greens: usize,
    next: usize,
    green_t: u64,
}

impl UniformCycle {
    pub fn new(layout: &IntersectionLayout, timing: &SignalTiming) -> Self {
        Self {
            n_greens: layout.n_greens().max(1),
            next: 0,
            green_t: u64::from(timing.g_min),
        }
    }
}

impl SignalPolicy for UniformCycle {
    fn next_phase(&mut self, _view: &PhaseView<'_>) -> Result<SignalState> {
        let phase = self.next;
        self.next = (self.next + 1) % self.n_greens;
        Ok(SignalState::Green(phase))
    }

    fn green_duration(&self, _phase: usize) -> u64 {
        self.green_t
    }
}
