//! Webster's method: a fixed cycle whose green splits are recomputed from
//! measured flows every `update_freq` ticks.

use super::{PhaseView, SignalPolicy, SignalState};
use crate::config::{SignalTiming, WebsterConfig};
use crate::environment::{IntersectionLayout, IntersectionObservation};
use crate::error::Result;
use std::collections::HashSet;

pub struct Webster {
    config: WebsterConfig,
    g_min: u64,
    lost_time: u64,
    next: usize,
    t: u64,
    /// Vehicles discharged per phase, per incoming lane of that phase.
    discharged: Vec<Vec<u64>>,
    durations: Vec<u64>,
    prev: Option<IntersectionObservation>,
}

/// Green time of each phase from its critical flow ratio.
///
/// `Y` is the ratio sum clamped to at most 0.85 (0.01 when zero), the cycle
/// is `C = int((1.5 L + 5) / (1 - Y))` clamped to `[c_min, c_max]`, and each
/// phase receives `int(y / Y * (C - L))` ticks, at least `g_min`.
pub fn webster_timings(critical: &[f64], lost_time: u64, g_min: u64, config: &WebsterConfig) -> Vec<u64> {
    let mut y_total: f64 = critical.iter().sum();
    if y_total > 0.85 {
        y_total = 0.85;
    } else if y_total == 0.0 {
        y_total = 0.01;
    }

    let l = lost_time as f64;
    let cycle = (((1.5 * l) + 5.0) / (1.0 - y_total)) as i64;
    let cycle = cycle.clamp(i64::from(config.c_min), i64::from(config.c_max.max(config.c_min)));
    let green_total = (cycle - lost_time as i64) as f64;

    critical
        .iter()
        .map(|y| {
            let g = ((y / y_total) * green_total) as i64;
            g.max(g_min as i64) as u64
        })
        .collect()
}

impl Webster {
    pub fn new(layout: &IntersectionLayout, timing: &SignalTiming, config: WebsterConfig) -> Self {
        let g_min = u64::from(timing.g_min);
        Self {
            lost_time: layout.n_greens() as u64 * u64::from(timing.yellow + timing.red),
            g_min,
            next: 0,
            t: 0,
            discharged: Self::empty_counts(layout),
            durations: vec![g_min; layout.n_greens()],
            prev: None,
            config,
        }
    }

    fn empty_counts(layout: &IntersectionLayout) -> Vec<Vec<u64>> {
        layout.phases.iter().map(|p| vec![0; p.incoming.len()]).collect()
    }

    /// Current green time of each phase.
    pub fn durations(&self) -> &[u64] {
        &self.durations
    }

    fn count_discharges(&mut self, layout: &IntersectionLayout, obs: &IntersectionObservation, phase: usize) {
        let (Some(prev), Some(lanes)) = (self.prev.as_ref(), layout.phases.get(phase)) else {
            return;
        };
        for (k, &lane) in lanes.incoming.iter().enumerate() {
            let now: HashSet<u64> = obs
                .incoming
                .get(lane)
                .map(|l| l.vehicles.iter().map(|v| v.id).collect())
                .unwrap_or_default();
            let left = prev
                .incoming
                .get(lane)
                .map(|l| l.vehicles.iter().filter(|v| !now.contains(&v.id)).count())
                .unwrap_or(0);
            self.discharged[phase][k] += left as u64;
        }
    }

    fn recompute(&mut self) {
        let period = self.config.update_freq.max(1) as f64;
        let critical: Vec<f64> = self
            .discharged
            .iter()
            .map(|lanes| {
                lanes
                    .iter()
                    .map(|&n| (n as f64 / period) / self.config.sat_flow)
                    .fold(0.0, f64::max)
            })
            .collect();
        self.durations = webster_timings(&critical, self.lost_time, self.g_min, &self.config);
    }
}

impl SignalPolicy for Webster {
    fn update(&mut self, view: &PhaseView<'_>) {
        if let SignalState::Green(g) = view.current {
            self.count_discharges(view.layout, view.obs, g);
        }
        if self.t % self.config.update_freq.max(1) == 0 {
            self.recompute();
            self.discharged = Self::empty_counts(view.layout);
        }
        self.prev = Some(view.obs.clone());
        self.t += 1;
    }

    fn next_phase(&mut self, _view: &PhaseView<'_>) -> Result<SignalState> {
        let phase = self.next;
        self.next = (self.next + 1) % self.durations.len().max(1);
        Ok(SignalState::Green(phase))
    }

    fn green_duration(&self, phase: usize) -> u64 {
        self.durations.get(phase).copied().unwrap_or(self.g_min)
    }
}
