//! Max pressure: serve the green whose incoming lanes most exceed its
//! outgoing lanes.

use super::{PhaseView, SignalPolicy, SignalState};
use crate::config::SignalTiming;
use crate::environment::{IntersectionLayout, IntersectionObservation};
use crate::error::Result;

pub struct MaxPressure {
    green_t: u64,
}

/// Pressure of one green phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePressure {
    pub incoming: usize,
    pub outgoing: usize,
}

impl PhasePressure {
    pub fn value(&self) -> i64 {
        self.incoming as i64 - self.outgoing as i64
    }

    pub fn is_empty(&self) -> bool {
        self.incoming == 0 && self.outgoing == 0
    }
}

/// Vehicle counts on each phase's incoming and outgoing lanes.
pub fn phase_pressures(layout: &IntersectionLayout, obs: &IntersectionObservation) -> Vec<PhasePressure> {
    layout
        .phases
        .iter()
        .map(|p| PhasePressure {
            incoming: p.incoming.iter().map(|&l| obs.incoming_count(l)).sum(),
            outgoing: p.outgoing.iter().map(|&l| obs.outgoing_count(l)).sum(),
        })
        .collect()
}

/// Index of the maximum-pressure phase, ties broken uniformly at random.
/// Uniformly random when no phase has any vehicle.
pub fn select_phase(pressures: &[PhasePressure], rng: &mut fastrand::Rng) -> usize {
    if pressures.is_empty() {
        return 0;
    }
    if pressures.iter().all(PhasePressure::is_empty) {
        return rng.usize(0..pressures.len());
    }
    let best = pressures.iter().map(PhasePressure::value).max().unwrap_or(0);
    let ties: Vec<usize> = pressures
        .iter()
        .enumerate()
        .filter(|(_, p)| p.value() == best)
        .map(|(i, _)| i)
        .collect();
    ties[rng.usize(0..ties.len())]
}

impl MaxPressure {
    pub fn new(timing: &SignalTiming) -> Self {
        Self {
            green_t: u64::from(timing.g_min),
        }
    }
}

impl SignalPolicy for MaxPressure {
    fn next_phase(&mut self, view: &PhaseView<'_>) -> Result<SignalState> {
        let pressures = phase_pressures(view.layout, view.obs);
        let mut rng = fastrand::Rng::new();
        Ok(SignalState::Green(select_phase(&pressures, &mut rng)))
    }

    fn green_duration(&self, _phase: usize) -> u64 {
        self.green_t
    }
}
