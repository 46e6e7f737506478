//! Vehicle travel times and per-episode actor records.

use crate::controllers::MetricHistory;
use crate::core::AgentId;
use crate::environment::VehicleEvent;
use crate::error::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Departure-to-arrival times of one episode.
#[derive(Debug, Clone, Default)]
pub struct TravelTimes {
    departed: HashMap<u64, u64>,
    completed: Vec<u64>,
}

impl TravelTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: VehicleEvent) {
        match event {
            VehicleEvent::Departed { vehicle, time } => {
                self.departed.insert(vehicle, time);
            }
            VehicleEvent::Arrived { vehicle, time } => {
                if let Some(start) = self.departed.remove(&vehicle) {
                    self.completed.push(time.saturating_sub(start));
                }
            }
        }
    }

    pub fn record_all(&mut self, events: impl IntoIterator<Item = VehicleEvent>) {
        for event in events {
            self.record(event);
        }
    }

    /// Completed trips.
    pub fn times(&self) -> &[u64] {
        &self.completed
    }

    /// Vehicles still travelling.
    pub fn in_flight(&self) -> usize {
        self.departed.len()
    }

    /// Population mean and standard deviation. Zero for an empty episode.
    pub fn summary(&self) -> (f64, f64) {
        if self.completed.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.completed.len() as f64;
        let mean = self.completed.iter().map(|&t| t as f64).sum::<f64>() / n;
        let var = self
            .completed
            .iter()
            .map(|&t| (t as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var.sqrt())
    }
}

/// Whether an actor with exploration rate `eps` keeps a travel-time CSV:
/// the fully random and the near-greedy actors do.
pub fn tracks_travel_time(eps: f32) -> bool {
    eps == 1.0 || eps < 0.02
}

/// Append `mean,std` to `<dir>/eps_<eps>.csv`.
pub fn append_travel_time(dir: &Path, eps: f32, mean: f64, std: f64) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("eps_{eps}.csv"));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{mean},{std}")?;
    Ok(path)
}

#[derive(Serialize)]
struct TravelRecord<'a> {
    travel_time: &'a [u64],
}

/// Test-mode output: `<dir>/<agent>.json` per controller plus
/// `<dir>/travel_time.json`.
pub fn write_test_metrics(
    dir: &Path,
    histories: &[(AgentId, MetricHistory)],
    travel: &TravelTimes,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (id, history) in histories {
        let writer = BufWriter::new(File::create(dir.join(format!("{id}.json")))?);
        serde_json::to_writer(writer, history)?;
    }
    let writer = BufWriter::new(File::create(dir.join("travel_time.json"))?);
    serde_json::to_writer(
        writer,
        &TravelRecord {
            travel_time: travel.times(),
        },
    )?;
    Ok(())
}
