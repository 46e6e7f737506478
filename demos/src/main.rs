//! `tsc-train`: run distributed traffic signal control on the corridor
//! simulator.
//!
//! ```text
//! tsc-train --controller dqn --mode train -n 4 -l 1 --intersections 3
//! tsc-train --controller dqn --mode test -n 1 --load
//! tsc-train --config runs/sotl.toml
//! ```

use clap::{Parser, ValueEnum};
use distributed_tsc::{
    init_logging, level_from_verbosity, BurnNetworkFactory, DefaultBackend, ExplorationSchedule,
    Mode, Orchestrator, Result, RunConfig, RunSummary,
};
use grid_traffic::{GridConfig, GridFactory};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Train,
    Test,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScheduleArg {
    Linear,
    Tiered,
}

/// Multi-actor, multi-learner traffic signal control
#[derive(Parser, Debug)]
#[command(name = "tsc-train")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML or JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller type: uniform, websters, maxpressure, sotl, dqn, ddpg
    #[arg(short, long)]
    controller: Option<String>,

    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Number of actors
    #[arg(short = 'n', long)]
    actors: Option<usize>,

    /// Number of learners
    #[arg(short = 'l', long)]
    learners: Option<usize>,

    /// Episode length in ticks
    #[arg(long)]
    sim_len: Option<u64>,

    /// Training steps per agent
    #[arg(long)]
    updates: Option<u64>,

    #[arg(long, value_enum)]
    exploration: Option<ScheduleArg>,

    /// Save weights periodically and at exit
    #[arg(long)]
    save: bool,

    /// Load saved weights
    #[arg(long)]
    load: bool,

    #[arg(long)]
    save_replay: bool,

    #[arg(long)]
    load_replay: bool,

    /// Intersections along the simulated corridor
    #[arg(long, default_value_t = 2)]
    intersections: usize,

    /// Vehicle arrival probability per boundary lane per tick
    #[arg(long, default_value_t = 0.1)]
    arrival_rate: f64,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(c) = &self.controller {
            config.controller = c.clone();
        }
        if let Some(m) = self.mode {
            config.mode = match m {
                ModeArg::Train => Mode::Train,
                ModeArg::Test => Mode::Test,
            };
        }
        if let Some(n) = self.actors {
            config.actors = n;
        }
        if let Some(l) = self.learners {
            config.learners = l;
        }
        if let Some(len) = self.sim_len {
            config.sim_len = len;
        }
        if let Some(u) = self.updates {
            config.rl.updates = u;
        }
        if let Some(s) = self.exploration {
            config.exploration = match s {
                ScheduleArg::Linear => ExplorationSchedule::Linear,
                ScheduleArg::Tiered => ExplorationSchedule::Tiered,
            };
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.io.save |= self.save;
        config.io.load |= self.load;
        config.io.save_replay |= self.save_replay;
        config.io.load_replay |= self.load_replay;
        Ok(config)
    }

    fn grid_config(&self, seed: u64) -> GridConfig {
        GridConfig::new(self.intersections)
            .with_arrival_rate(self.arrival_rate)
            .with_seed(seed)
    }
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let config = cli.run_config()?;
    let log_path = init_logging(&cli.log_dir, &config.controller, level_from_verbosity(cli.verbose))?;
    log::info!("logging to {}", log_path.display());
    log::debug!("run config: {config:?}");

    let sims = GridFactory::new(cli.grid_config(config.seed))?;
    let nets = BurnNetworkFactory::<DefaultBackend>::new(config.nn.clone());
    Orchestrator::new(config, Arc::new(sims), Arc::new(nets))?.run()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(summary) => {
            println!(
                "{}: {} actors, {} learners, {} episodes in {:.1}s",
                summary.controller,
                summary.actors,
                summary.learners,
                summary.episodes.len(),
                summary.wall_secs
            );
            if let Some(t) = summary.greedy_travel_time() {
                println!("greedy actor mean travel time: {t:.1} ticks");
            }
            for stats in &summary.learner_stats {
                println!(
                    "learner {}: {} train steps over {} agents",
                    stats.learner_id,
                    stats.train_steps,
                    stats.updates.len()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("run failed: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
