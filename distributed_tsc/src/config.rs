//! Run configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Files ending in `.toml` are parsed with `toml`, anything else as
//! JSON.
//!
//! ```toml
//! controller = "dqn"
//! mode = "train"
//! actors = 4
//! learners = 1
//!
//! [rl]
//! updates = 5000
//! batch_size = 32
//! ```

use crate::error::{Result, TscError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether agents learn during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Test,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// Per-actor exploration schedule in train mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorationSchedule {
    /// Linear ramp from 1.0 down to `eps` across actor indices.
    Linear,
    /// Cycle `{1.0, 0.5, eps}` across actors.
    Tiered,
}

/// Signal timing shared by every controller (seconds, one tick per second).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTiming {
    pub g_min: u32,
    pub g_max: u32,
    pub yellow: u32,
    pub red: u32,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            g_min: 5,
            g_max: 30,
            yellow: 2,
            red: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsterConfig {
    pub c_min: u32,
    pub c_max: u32,
    /// Saturation flow in vehicles per second per lane.
    pub sat_flow: f64,
    /// Ticks between green-split recomputations.
    pub update_freq: u64,
}

impl Default for WebsterConfig {
    fn default() -> Self {
        Self {
            c_min: 60,
            c_max: 180,
            sat_flow: 0.38,
            update_freq: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SotlConfig {
    /// Vehicle-tick threshold on red approaches.
    pub theta: f64,
    /// Distance window from the stop line, in metres.
    pub omega: f32,
    /// Platoon size cap.
    pub mu: usize,
}

impl Default for SotlConfig {
    fn default() -> Self {
        Self {
            theta: 45.0,
            omega: 1.0,
            mu: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// Minimum exploration rate.
    pub eps: f32,
    pub n_steps: usize,
    /// Experience budget per agent; replay capacity is `replay_size / n_steps`.
    pub replay_size: usize,
    pub batch_size: usize,
    pub gamma: f32,
    /// Training steps per agent.
    pub updates: u64,
    /// Updates between target network syncs.
    pub target_freq: u64,
    /// Soft update coefficient for continuous agents.
    pub tau: f32,
    /// Maximum train steps per agent per learner iteration.
    pub batches_per_round: usize,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            eps: 0.01,
            n_steps: 1,
            replay_size: 10_000,
            batch_size: 32,
            gamma: 0.99,
            updates: 10_000,
            target_freq: 50,
            tau: 0.005,
            batches_per_round: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NnConfig {
    pub lr: f64,
    pub lr_critic: f64,
    /// Hidden width as a multiple of the input width.
    pub hidden_scale: usize,
    pub hidden_layers: usize,
    pub optimizer_eps: f32,
}

impl Default for NnConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            lr_critic: 1e-3,
            hidden_scale: 3,
            hidden_layers: 2,
            optimizer_eps: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Save weights periodically and at exit.
    pub save: bool,
    /// Load weights at startup.
    pub load: bool,
    pub save_replay: bool,
    pub load_replay: bool,
    pub save_path: PathBuf,
    pub progress_dir: PathBuf,
    pub metrics_dir: PathBuf,
    /// Seconds between weight saves and progress rows.
    pub save_interval_secs: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            save: false,
            load: false,
            save_replay: false,
            load_replay: false,
            save_path: PathBuf::from("saved_models"),
            progress_dir: PathBuf::from("tmp"),
            metrics_dir: PathBuf::from("metrics"),
            save_interval_secs: 120,
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Controller type: uniform, websters, maxpressure, sotl, dqn or ddpg.
    pub controller: String,
    pub mode: Mode,
    pub actors: usize,
    pub learners: usize,
    /// Episode length in ticks.
    pub sim_len: u64,
    /// Largest start offset as a fraction of `sim_len`.
    pub offset: f64,
    pub exploration: ExplorationSchedule,
    pub seed: u64,
    pub signal: SignalTiming,
    pub webster: WebsterConfig,
    pub sotl: SotlConfig,
    pub rl: RlConfig,
    pub nn: NnConfig,
    pub io: IoConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            controller: "sotl".to_string(),
            mode: Mode::Test,
            actors: 1,
            learners: 1,
            sim_len: 10_800,
            offset: 0.25,
            exploration: ExplorationSchedule::Linear,
            seed: 0,
            signal: SignalTiming::default(),
            webster: WebsterConfig::default(),
            sotl: SotlConfig::default(),
            rl: RlConfig::default(),
            nn: NnConfig::default(),
            io: IoConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML or JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        Ok(config)
    }

    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = controller.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_actors(mut self, n: usize) -> Self {
        self.actors = n;
        self
    }

    pub fn with_learners(mut self, l: usize) -> Self {
        self.learners = l;
        self
    }

    pub fn with_sim_len(mut self, ticks: u64) -> Self {
        self.sim_len = ticks;
        self
    }

    pub fn with_offset(mut self, fraction: f64) -> Self {
        self.offset = fraction;
        self
    }

    pub fn with_updates(mut self, updates: u64) -> Self {
        self.rl.updates = updates;
        self
    }

    pub fn with_replay_size(mut self, size: usize) -> Self {
        self.rl.replay_size = size;
        self
    }

    pub fn with_batch_size(mut self, batch: usize) -> Self {
        self.rl.batch_size = batch;
        self
    }

    pub fn with_n_steps(mut self, n: usize) -> Self {
        self.rl.n_steps = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Per-agent replay capacity: `replay_size / n_steps`, at least 1.
    pub fn replay_capacity(&self) -> usize {
        (self.rl.replay_size / self.rl.n_steps.max(1)).max(1)
    }

    /// Check value ranges.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.rl.n_steps == 0 {
            return Err("rl.n_steps must be > 0");
        }
        if self.rl.batch_size == 0 {
            return Err("rl.batch_size must be > 0");
        }
        if self.rl.target_freq == 0 {
            return Err("rl.target_freq must be > 0");
        }
        if self.rl.batches_per_round == 0 {
            return Err("rl.batches_per_round must be > 0");
        }
        if !(0.0..=1.0).contains(&self.rl.gamma) {
            return Err("rl.gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.rl.tau) {
            return Err("rl.tau must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.rl.eps) {
            return Err("rl.eps must be in [0, 1]");
        }
        if self.signal.g_min == 0 {
            return Err("signal.g_min must be > 0");
        }
        if self.signal.g_max < self.signal.g_min {
            return Err("signal.g_max must be >= signal.g_min");
        }
        if self.webster.c_min > self.webster.c_max {
            return Err("webster.c_min must be <= webster.c_max");
        }
        if self.webster.update_freq == 0 {
            return Err("webster.update_freq must be > 0");
        }
        if self.webster.sat_flow <= 0.0 {
            return Err("webster.sat_flow must be > 0");
        }
        if self.sim_len == 0 {
            return Err("sim_len must be > 0");
        }
        if !(0.0..1.0).contains(&self.offset) {
            return Err("offset must be in [0, 1)");
        }
        if self.nn.hidden_scale == 0 {
            return Err("nn.hidden_scale must be > 0");
        }
        Ok(())
    }

    /// [`validate`](Self::validate) lifted into the crate error.
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(TscError::config)
    }
}
