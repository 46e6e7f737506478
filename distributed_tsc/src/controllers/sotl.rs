//! Self-organising traffic lights.
//!
//! The current green is held for at least `g_min` ticks. Meanwhile `kappa`
//! integrates the vehicles waiting on red approaches. After the minimum, the
//! controller advances once `kappa` exceeds `theta`, and is forced to advance
//! when the vehicles within `omega` metres of the stop line on the current
//! green are more than `mu` or none at all.

use super::{PhaseView, SignalPolicy, SignalState};
use crate::config::{SignalTiming, SotlConfig};
use crate::environment::{IntersectionLayout, IntersectionObservation};
use crate::error::Result;

pub struct Sotl {
    config: SotlConfig,
    g_min: u64,
    phase_idx: usize,
    kappa: f64,
    red_lanes: Vec<Vec<usize>>,
}

/// Vehicles within `omega` metres of the stop line on `lanes`.
pub fn approaching(
    layout: &IntersectionLayout,
    obs: &IntersectionObservation,
    lanes: &[usize],
    omega: f32,
) -> usize {
    lanes
        .iter()
        .filter_map(|&l| Some((layout.incoming.get(l)?, obs.incoming.get(l)?)))
        .map(|(info, lane)| {
            lane.vehicles
                .iter()
                .filter(|v| info.length - v.position < omega)
                .count()
        })
        .sum()
}

impl Sotl {
    pub fn new(layout: &IntersectionLayout, timing: &SignalTiming, config: SotlConfig) -> Self {
        Self {
            config,
            g_min: u64::from(timing.g_min),
            phase_idx: 0,
            kappa: 0.0,
            red_lanes: (0..layout.n_greens()).map(|g| layout.red_lanes(g)).collect(),
        }
    }

    fn n_greens(&self) -> usize {
        self.red_lanes.len().max(1)
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }
}

impl SignalPolicy for Sotl {
    fn update(&mut self, view: &PhaseView<'_>) {
        let g = self.phase_idx % self.n_greens();
        if let Some(red) = self.red_lanes.get(g) {
            self.kappa += red.iter().map(|&l| view.obs.incoming_count(l)).sum::<usize>() as f64;
        }
    }

    fn next_phase(&mut self, view: &PhaseView<'_>) -> Result<SignalState> {
        if let SignalState::Green(g) = view.current {
            if view.time_in_state >= self.g_min {
                let lanes = view
                    .layout
                    .phases
                    .get(g)
                    .map(|p| p.incoming.as_slice())
                    .unwrap_or(&[]);
                let n = approaching(view.layout, view.obs, lanes, self.config.omega);
                if n > self.config.mu || n == 0 || self.kappa > self.config.theta {
                    self.phase_idx += 1;
                    self.kappa = 0.0;
                }
            }
        }
        Ok(SignalState::Green(self.phase_idx % self.n_greens()))
    }

    /// Greens are re-evaluated every tick.
    fn green_duration(&self, _phase: usize) -> u64 {
        1
    }
}
