//! Per-intersection traffic measures: delay (reward signal) and queue.

use super::phase::STOP_SPEED;
use crate::environment::{IntersectionLayout, IntersectionObservation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tick histories kept in test mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    pub delay: Vec<f32>,
    pub queue: Vec<usize>,
}

/// Tracks vehicles on an intersection's incoming lanes.
#[derive(Debug, Clone)]
pub struct TrafficMetrics {
    free_flow: Vec<f32>,
    /// vehicle -> (tick first seen, incoming lane)
    seen: HashMap<u64, (u64, usize)>,
    t: u64,
    delay: f32,
    queue: usize,
    history: Option<MetricHistory>,
}

impl TrafficMetrics {
    /// `record_history` keeps one sample per tick (test mode).
    pub fn new(layout: &IntersectionLayout, record_history: bool) -> Self {
        Self {
            free_flow: layout.incoming.iter().map(|l| l.free_flow_time()).collect(),
            seen: HashMap::new(),
            t: 0,
            delay: 0.0,
            queue: 0,
            history: record_history.then(MetricHistory::default),
        }
    }

    pub fn update(&mut self, obs: &IntersectionObservation) {
        let mut present = HashMap::with_capacity(self.seen.len());
        let mut queue = 0;
        for (lane, lane_obs) in obs.incoming.iter().enumerate() {
            queue += lane_obs.queued(STOP_SPEED);
            for v in &lane_obs.vehicles {
                let entry = self.seen.get(&v.id).copied().unwrap_or((self.t, lane));
                present.insert(v.id, entry);
            }
        }
        self.seen = present;
        self.queue = queue;
        // delay is read after the tick that produced `obs` has elapsed
        self.t += 1;
        self.delay = self
            .seen
            .values()
            .map(|&(since, lane)| {
                let on_lane = (self.t - since) as f32;
                let free = self.free_flow.get(lane).copied().unwrap_or(0.0);
                (on_lane - free).max(0.0)
            })
            .sum();

        if let Some(history) = self.history.as_mut() {
            history.delay.push(self.delay);
            history.queue.push(self.queue);
        }
    }

    /// Time on the approach beyond free-flow travel, summed over vehicles
    /// currently on incoming lanes. A vehicle first seen in the `k`-th
    /// update has spent `n - k + 1` ticks on its lane after the `n`-th.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Stopped vehicles on incoming lanes.
    pub fn queue(&self) -> usize {
        self.queue
    }

    /// Negated delay, truncated to whole ticks.
    pub fn reward(&self) -> f32 {
        -self.delay.trunc()
    }

    pub fn history(&self) -> Option<&MetricHistory> {
        self.history.as_ref()
    }

    pub fn take_history(&mut self) -> Option<MetricHistory> {
        self.history.take()
    }
}
