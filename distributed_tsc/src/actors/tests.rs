use super::*;
use crate::agents::{distribute_weights, AgentKind};
use crate::config::{Mode, NnConfig, RunConfig};
use crate::controllers::MetricHistory;
use crate::core::{AgentId, SharedState};
use crate::environment::scripted::{four_way, queued, ScriptedFactory};
use crate::environment::SimulationFactory;
use crate::error::TscError;
use crate::nn::{BurnNetworkFactory, DefaultBackend, NetworkDims, NetworkFactory};
use crossbeam_channel::{unbounded, Receiver};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn sims(counts: [usize; 4]) -> Arc<dyn SimulationFactory> {
    let layout = four_way("J");
    Arc::new(ScriptedFactory {
        script: vec![queued(&layout, &counts)],
        layouts: vec![layout],
    })
}

fn nets() -> Arc<dyn NetworkFactory> {
    Arc::new(BurnNetworkFactory::<DefaultBackend>::new(NnConfig {
        hidden_scale: 1,
        ..NnConfig::default()
    }))
}

fn run_config(controller: &str, mode: Mode, dir: &Path) -> RunConfig {
    let mut config = RunConfig::new()
        .with_controller(controller)
        .with_mode(mode)
        .with_sim_len(40);
    config.io.progress_dir = dir.join("progress");
    config.io.metrics_dir = dir.join("metrics");
    config.io.save_path = dir.join("saved");
    config
}

fn worker(
    actor: ActorConfig,
    config: RunConfig,
    shared: &Arc<SharedState>,
    counts: [usize; 4],
) -> (ActorWorker, Receiver<ActorReport>) {
    let (tx, rx) = unbounded();
    let w = ActorWorker::new(actor, Arc::new(config), shared.clone(), sims(counts), nets(), tx)
        .unwrap();
    (w, rx)
}

fn episodes(rx: &Receiver<ActorReport>) -> Vec<EpisodeSummary> {
    rx.try_iter()
        .filter_map(|r| match r {
            ActorReport::EpisodeFinished(s) => Some(s),
            ActorReport::Finished { .. } => None,
        })
        .collect()
}

#[test]
fn test_config_validation() {
    assert!(ActorConfig::new(0).with_epsilon(0.5).validate().is_ok());
    assert!(ActorConfig::new(0).with_epsilon(1.5).validate().is_err());

    let shared = Arc::new(SharedState::new(vec![AgentId::from("J")], 10, 1, 0));
    let (tx, _rx) = unbounded();
    let err = ActorWorker::new(
        ActorConfig::new(0),
        Arc::new(RunConfig::new().with_controller("fixed")),
        shared,
        sims([0; 4]),
        nets(),
        tx,
    );
    assert!(matches!(err, Err(TscError::Configuration(_))));
}

#[test]
fn test_test_mode_writes_metrics_and_travel_times() {
    let dir = tempdir().unwrap();
    let shared = Arc::new(SharedState::new(vec![AgentId::from("J")], 10, 1, 0));
    let config = run_config("uniform", Mode::Test, dir.path()).with_sim_len(20);
    let (w, rx) = worker(ActorConfig::new(0).with_epsilon(0.01), config, &shared, [1, 0, 0, 0]);
    assert_eq!(w.thread_name(), "tsc-actor-0");
    w.run().unwrap();

    // scripted trips take exactly 3 ticks; vehicles departing after t=16 are still out
    let eps = episodes(&rx);
    assert_eq!(eps.len(), 1);
    assert_eq!(eps[0].vehicles, 17);
    assert_eq!(eps[0].mean_travel_time, 3.0);
    assert_eq!(eps[0].std_travel_time, 0.0);

    let out = dir.path().join("metrics/uniform/actor_0");
    let history: MetricHistory =
        serde_json::from_str(&fs::read_to_string(out.join("J.json")).unwrap()).unwrap();
    assert_eq!(history.queue.len(), 20);
    assert!(out.join("travel_time.json").exists());

    let csv = fs::read_to_string(dir.path().join("progress/eps_0.01.csv")).unwrap();
    assert_eq!(csv, "3,0\n");
}

#[test]
fn test_offset_runs_before_controllers() {
    let dir = tempdir().unwrap();
    let shared = Arc::new(SharedState::new(vec![AgentId::from("J")], 10, 1, 0));
    let config = run_config("maxpressure", Mode::Test, dir.path()).with_sim_len(30);
    let (w, rx) = worker(
        ActorConfig::new(0).with_epsilon(0.5).with_offset(10),
        config,
        &shared,
        [0, 0, 2, 0],
    );
    w.run().unwrap();

    let out = dir.path().join("metrics/maxpressure/actor_0");
    let history: MetricHistory =
        serde_json::from_str(&fs::read_to_string(out.join("J.json")).unwrap()).unwrap();
    assert_eq!(history.delay.len(), 20);
    // eps 0.5 keeps no travel-time csv
    assert!(!dir.path().join("progress/eps_0.5.csv").exists());
    assert_eq!(episodes(&rx).len(), 1);
}

#[test]
fn test_non_learning_train_runs_one_episode() {
    let dir = tempdir().unwrap();
    let shared = Arc::new(SharedState::new(vec![AgentId::from("J")], 10, 1, 0));
    let config = run_config("sotl", Mode::Train, dir.path());
    let (w, rx) = worker(ActorConfig::new(0).with_epsilon(1.0), config, &shared, [1, 1, 1, 1]);
    w.run().unwrap();

    let reports: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        reports.last(),
        Some(&ActorReport::Finished {
            actor: 0,
            episodes: 1
        })
    );
    assert!(shared.replay(&AgentId::from("J")).unwrap().is_empty());
}

#[test]
fn test_learning_actor_stops_once_updates_reached() {
    let dir = tempdir().unwrap();
    let id = AgentId::from("J");
    let layout = four_way("J");
    // actor plus this thread standing in for the learner
    let shared = Arc::new(SharedState::new(vec![id.clone()], 1000, 2, 1));
    let config = run_config("dqn", Mode::Train, dir.path()).with_updates(1);
    let (w, rx) = worker(ActorConfig::new(0).with_epsilon(1.0).with_offset(5), config, &shared, [2, 2, 2, 2]);
    let handle = w.spawn().unwrap();
    assert_eq!(handle.name(), "tsc-actor-0");

    let stats = shared.stats(&id).unwrap();
    let mut learner_nets = nets().build(
        AgentKind::Discrete,
        NetworkDims::new(layout.state_dim(), layout.n_greens()),
        true,
    );
    distribute_weights(&mut learner_nets, stats).unwrap();
    shared.barrier().wait();
    shared.barrier().wait();

    let replay = shared.replay(&id).unwrap();
    let deadline = Instant::now() + Duration::from_secs(120);
    while replay.is_empty() {
        assert!(Instant::now() < deadline, "actor produced no experience");
        std::thread::sleep(Duration::from_millis(5));
    }
    stats.increment_updates();
    handle.join().unwrap();

    let eps = episodes(&rx);
    assert!(!eps.is_empty());
    assert!(eps.iter().all(|e| e.epsilon == 1.0));
    assert!(dir.path().join("progress/eps_1.csv").exists());
    assert!(replay.snapshot().iter().all(|t| t.len() == 1));
}
