//! Learner tests. The test thread stands in for the actors where a run
//! needs them: it joins the barrier and fills the replays directly.

use super::*;
use crate::checkpoint::{Checkpointer, CheckpointerConfig};
use crate::config::{Mode, NnConfig, RunConfig};
use crate::core::{Action, AgentId, Experience, SharedState, Trajectory, WeightKey};
use crate::environment::scripted::four_way;
use crate::environment::Topology;
use crate::error::TscError;
use crate::metrics::ProgressColumn;
use crate::nn::{BurnNetworkFactory, DefaultBackend, NetworkFactory};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn nets() -> Arc<dyn NetworkFactory> {
    Arc::new(BurnNetworkFactory::<DefaultBackend>::new(NnConfig {
        hidden_scale: 1,
        ..NnConfig::default()
    }))
}

fn topology(ids: &[&str]) -> Arc<Topology> {
    Arc::new(Topology::new(ids.iter().map(|id| four_way(id)).collect()))
}

fn run_config(controller: &str, dir: &Path) -> RunConfig {
    let mut config = RunConfig::new()
        .with_controller(controller)
        .with_mode(Mode::Train)
        .with_replay_size(8)
        .with_batch_size(4)
        .with_updates(3);
    config.io.progress_dir = dir.join("progress");
    config.io.save_path = dir.join("saved");
    config
}

fn learner_config(id: usize) -> LearnerConfig {
    LearnerConfig::new(id)
        .with_save_interval(Duration::from_millis(20))
        .with_idle_poll(Duration::from_millis(2))
}

/// A one-step trajectory shaped for `four_way` (11 state features).
fn trajectory(action: Action, reward: f32) -> Trajectory {
    let state = vec![0.1; 11];
    let next = vec![0.2; 11];
    Trajectory::from_steps(vec![Experience::new(state, action, next, reward, false)])
}

fn fill(shared: &SharedState, id: &str, n: usize, action: impl Fn(usize) -> Action) {
    let replay = shared.replay(&AgentId::from(id)).unwrap();
    for i in 0..n {
        replay.append(trajectory(action(i), -(i as f32)));
    }
}

#[test]
fn test_config_validation() {
    assert!(LearnerConfig::default().validate().is_ok());
    assert!(LearnerConfig::new(0)
        .with_save_interval(Duration::ZERO)
        .validate()
        .is_err());
    assert!(LearnerConfig::new(0).writes_progress());
    assert!(!LearnerConfig::new(1).writes_progress());
}

#[test]
fn test_non_learning_controller_rejected() {
    let dir = tempdir().unwrap();
    let shared = Arc::new(SharedState::new(vec![AgentId::from("J")], 8, 1, 1));
    let err = LearnerWorker::new(
        learner_config(0),
        Arc::new(run_config("websters", dir.path())),
        shared,
        topology(&["J"]),
        nets(),
    );
    assert!(matches!(err, Err(TscError::Configuration(_))));
}

#[test]
fn test_trains_to_budget_once_replay_full() {
    let dir = tempdir().unwrap();
    let id = AgentId::from("J");
    // learner plus this thread standing in for the actor
    let shared = Arc::new(SharedState::new(vec![id.clone()], 8, 2, 1));
    let mut config = run_config("dqn", dir.path());
    config.io.save = true;
    config.io.save_replay = true;

    let worker = LearnerWorker::new(
        learner_config(0),
        Arc::new(config),
        shared.clone(),
        topology(&["J"]),
        nets(),
    )
    .unwrap();
    assert_eq!(worker.thread_name(), "tsc-learner-0");
    let handle = worker.spawn().unwrap();

    shared.barrier().wait();
    let stats = shared.stats(&id).unwrap();
    // initial weights are published before the first rendezvous
    assert_eq!(stats.weight_version(WeightKey::POLICY_ONLINE), 1);
    assert_eq!(stats.weight_version(WeightKey::POLICY_TARGET), 1);
    shared.barrier().wait();

    fill(&shared, "J", 8, |i| Action::Discrete(i % 2));
    let result = handle.join().unwrap();

    assert_eq!(result.updates.get(&id), Some(&3));
    assert_eq!(result.train_steps, 3);
    assert!(result.last_loss.is_some());
    assert_eq!(stats.updates(), 3);
    // reset to the replay length on first fill, then one per step
    assert_eq!(stats.available_experience(), 5);
    assert_eq!(stats.weight_version(WeightKey::POLICY_ONLINE), 4);
    assert!(shared.replay(&id).unwrap().len() <= 8);

    let ck = Checkpointer::new(CheckpointerConfig::new(dir.path().join("saved"), "dqn"));
    assert!(ck.weights_path(&id, "q", crate::core::NetRole::Online).exists());
    assert!(ck.weights_path(&id, "q", crate::core::NetRole::Target).exists());
    assert!(ck.replay_path(&id).exists());

    let progress: Vec<_> = fs::read_dir(dir.path().join("progress"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(progress.len(), 3);
    for column in ProgressColumn::ALL {
        assert!(progress
            .iter()
            .any(|name| name.ends_with(&format!("_{}.csv", column.as_str()))));
    }
}

#[test]
fn test_full_replay_trains_every_round_within_capacity() {
    let dir = tempdir().unwrap();
    let id = AgentId::from("J");
    let shared = Arc::new(SharedState::new(vec![id.clone()], 8, 1, 1));
    let mut config = run_config("dqn", dir.path()).with_updates(100);
    config.rl.batches_per_round = 2;
    let worker = LearnerWorker::new(
        learner_config(0),
        Arc::new(config),
        shared.clone(),
        topology(&["J"]),
        nets(),
    )
    .unwrap();
    let mut networks = worker.build_networks(&[id.clone()]).unwrap();
    let mut owned = worker.build_agents(&mut networks).unwrap();

    let replay = shared.replay(&id).unwrap();
    let stats = shared.stats(&id).unwrap();
    let mut primed = HashSet::new();
    fill(&shared, "J", 8, |i| Action::Discrete(i % 2));

    for round in 0..6 {
        let before = stats.updates();
        let mut losses = Vec::new();
        let steps = worker
            .train_agent(&mut owned[0], &mut primed, &mut losses)
            .unwrap();
        assert_eq!(steps, 2, "round {round}");
        assert_eq!(stats.updates(), before + steps, "round {round}");
        assert_eq!(losses.len() as u64, steps);
        assert!(replay.len() <= replay.capacity(), "round {round}");

        // actors keep appending between rounds
        fill(&shared, "J", 3, |i| Action::Discrete(i % 2));
        assert!(replay.len() > replay.capacity());
    }
    assert_eq!(stats.updates(), 12);
    assert_eq!(replay.total_appended(), 8 + 6 * 3);
}

#[test]
fn test_waits_for_full_replay() {
    let dir = tempdir().unwrap();
    let id = AgentId::from("J");
    let shared = Arc::new(SharedState::new(vec![id.clone()], 8, 2, 1));
    let handle = LearnerWorker::new(
        learner_config(0),
        Arc::new(run_config("dqn", dir.path())),
        shared.clone(),
        topology(&["J"]),
        nets(),
    )
    .unwrap()
    .spawn()
    .unwrap();
    shared.barrier().wait();
    shared.barrier().wait();

    fill(&shared, "J", 7, |_| Action::Discrete(0));
    std::thread::sleep(Duration::from_millis(100));
    let stats = shared.stats(&id).unwrap();
    assert_eq!(stats.updates(), 0);
    assert!(handle.is_running());

    fill(&shared, "J", 1, |_| Action::Discrete(1));
    handle.join().unwrap();
    assert_eq!(stats.updates(), 3);
}

#[test]
fn test_trains_from_loaded_replay() {
    let dir = tempdir().unwrap();
    let id = AgentId::from("J");

    // a replay left by an earlier run
    let earlier = SharedState::new(vec![id.clone()], 8, 1, 1);
    fill(&earlier, "J", 8, |i| Action::Continuous(vec![(i as f32 / 8.0) - 0.5]));
    let ck = Checkpointer::new(CheckpointerConfig::new(dir.path().join("saved"), "ddpg"));
    ck.save_replay(&id, earlier.replay(&id).unwrap()).unwrap();

    let mut config = run_config("ddpg", dir.path());
    config.io.load_replay = true;
    let shared = Arc::new(SharedState::new(vec![id.clone()], 8, 1, 1));
    let result = LearnerWorker::new(
        learner_config(0),
        Arc::new(config),
        shared.clone(),
        topology(&["J"]),
        nets(),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(result.updates.get(&id), Some(&3));
    let stats = shared.stats(&id).unwrap();
    assert_eq!(stats.reward_scale(), 7.0);
    assert_eq!(stats.weight_version(WeightKey::CRITIC_ONLINE), 1);
}

#[test]
fn test_learners_own_round_robin_shares() {
    let dir = tempdir().unwrap();
    let ids = vec![AgentId::from("A"), AgentId::from("B")];
    let shared = Arc::new(SharedState::new(ids.clone(), 8, 2, 2));
    fill(&shared, "A", 8, |i| Action::Discrete(i % 2));
    fill(&shared, "B", 8, |i| Action::Discrete(i % 2));

    let config = Arc::new(run_config("dqn", dir.path()));
    let handles: Vec<_> = (0..2)
        .map(|l| {
            LearnerWorker::new(
                learner_config(l),
                config.clone(),
                shared.clone(),
                topology(&["A", "B"]),
                nets(),
            )
            .unwrap()
            .spawn()
            .unwrap()
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results[0].updates.keys().collect::<Vec<_>>(), vec![&ids[0]]);
    assert_eq!(results[1].updates.keys().collect::<Vec<_>>(), vec![&ids[1]]);
    assert!(shared.all_updates_reached(3));
}
