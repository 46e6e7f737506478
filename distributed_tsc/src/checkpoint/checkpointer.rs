//! Weight and replay checkpoints.
//!
//! Layout under the save root:
//!
//! ```text
//! <save_path>/
//!   weights/<controller>/<agent>/{q,policy,critic}_{online,target}.bin
//!   replay/<controller>/<agent>.json
//! ```
//!
//! Weights go through each approximator's own `save`/`load` (burn
//! `BinFileRecorder`); replays are plain JSON arrays of trajectories.

use crate::core::{AgentId, NetRole, SharedAgentStats, SharedReplay, Trajectory};
use crate::error::{Result, TscError};
use crate::nn::{AgentNetworks, WeightTransfer};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Checkpoint locations for one controller type.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Root directory of every checkpoint.
    pub save_path: PathBuf,
    /// Controller name, one sub-tree per controller type.
    pub controller: String,
}

impl CheckpointerConfig {
    pub fn new(save_path: impl Into<PathBuf>, controller: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
            controller: controller.into(),
        }
    }
}

/// Saves and restores agent weights and replays.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    config: CheckpointerConfig,
}

fn role_suffix(role: NetRole) -> &'static str {
    match role {
        NetRole::Online => "online",
        NetRole::Target => "target",
    }
}

impl Checkpointer {
    pub fn new(config: CheckpointerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Directory holding every weight file of `agent`.
    pub fn weights_dir(&self, agent: &AgentId) -> PathBuf {
        self.config
            .save_path
            .join("weights")
            .join(&self.config.controller)
            .join(agent.as_str())
    }

    /// File of network `net` (`q`, `policy` or `critic`) in `role`.
    pub fn weights_path(&self, agent: &AgentId, net: &str, role: NetRole) -> PathBuf {
        self.weights_dir(agent)
            .join(format!("{net}_{}.bin", role_suffix(role)))
    }

    pub fn replay_path(&self, agent: &AgentId) -> PathBuf {
        self.config
            .save_path
            .join("replay")
            .join(&self.config.controller)
            .join(format!("{agent}.json"))
    }

    /// Save one network of `agent`, its target copy included when present.
    pub(crate) fn save_net<N: WeightTransfer + ?Sized>(
        &self,
        agent: &AgentId,
        net: &str,
        n: &N,
    ) -> Result<()> {
        n.save(NetRole::Online, &self.weights_path(agent, net, NetRole::Online))?;
        if n.has_target() {
            n.save(NetRole::Target, &self.weights_path(agent, net, NetRole::Target))?;
        }
        Ok(())
    }

    /// Load every network of `agent`.
    ///
    /// The online file is required. A target copy falls back to the online
    /// file when its own file is absent.
    pub fn load_networks(&self, agent: &AgentId, networks: &mut AgentNetworks) -> Result<()> {
        match networks {
            AgentNetworks::Discrete { q } => self.load_net(agent, "q", q.as_mut()),
            AgentNetworks::Continuous { policy, critic } => {
                self.load_net(agent, "policy", policy.as_mut())?;
                if let Some(critic) = critic {
                    self.load_net(agent, "critic", critic.as_mut())?;
                }
                Ok(())
            }
        }
    }

    fn load_net<N: WeightTransfer + ?Sized>(
        &self,
        agent: &AgentId,
        net: &str,
        n: &mut N,
    ) -> Result<()> {
        let online = self.weights_path(agent, net, NetRole::Online);
        n.load(&online, NetRole::Online)?;
        if n.has_target() {
            let target = self.weights_path(agent, net, NetRole::Target);
            let source = if target.exists() { target } else { online };
            n.load(&source, NetRole::Target)?;
        }
        log::debug!("loaded {net} weights of agent {agent}");
        Ok(())
    }

    /// Write the current contents of `replay`.
    pub fn save_replay(&self, agent: &AgentId, replay: &SharedReplay) -> Result<PathBuf> {
        let path = self.replay_path(agent);
        write_trajectories(&path, &replay.snapshot())?;
        log::info!("saved {} trajectories of agent {agent} to {}", replay.len(), path.display());
        Ok(path)
    }

    /// Fill `replay` from disk and raise the agent's reward scale to the
    /// loaded rewards.
    ///
    /// A missing file is logged and skipped. Returns the number of
    /// trajectories loaded.
    pub fn load_replay(
        &self,
        agent: &AgentId,
        replay: &SharedReplay,
        stats: &SharedAgentStats,
    ) -> Result<usize> {
        let path = self.replay_path(agent);
        if !path.exists() {
            log::warn!("no replay checkpoint for agent {agent} at {}", path.display());
            return Ok(0);
        }
        let trajectories = read_trajectories(&path)?;
        let n = trajectories.len();
        replay.extend(trajectories);
        stats.observe_reward(replay.max_abs_reward());
        log::info!("loaded {n} trajectories for agent {agent}");
        Ok(n)
    }
}

fn write_trajectories(path: &Path, trajectories: &[Trajectory]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, trajectories)?;
    Ok(())
}

fn read_trajectories(path: &Path) -> Result<Vec<Trajectory>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TscError::MissingResource(path.to_path_buf()),
        _ => TscError::Io(e),
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use crate::config::NnConfig;
    use crate::core::{shared_replay, AgentStats, Experience, Action};
    use crate::nn::{BurnNetworkFactory, NetworkDims, NetworkFactory};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn trajectory(reward: f32) -> Trajectory {
        Trajectory::from_steps(vec![Experience::new(
            vec![0.0, 1.0],
            Action::Discrete(1),
            vec![1.0, 0.0],
            reward,
            false,
        )])
    }

    fn factory() -> BurnNetworkFactory {
        BurnNetworkFactory::new(NnConfig {
            hidden_scale: 1,
            ..NnConfig::default()
        })
    }

    #[test]
    fn test_paths() {
        let ck = Checkpointer::new(CheckpointerConfig::new("/tmp/run", "dqn"));
        let id = AgentId::from("gneJ0");
        assert_eq!(
            ck.weights_path(&id, "q", NetRole::Target),
            PathBuf::from("/tmp/run/weights/dqn/gneJ0/q_target.bin")
        );
        assert_eq!(ck.replay_path(&id), PathBuf::from("/tmp/run/replay/dqn/gneJ0.json"));
    }

    #[test]
    fn test_replay_roundtrip_restores_reward_scale() {
        let dir = tempdir().unwrap();
        let ck = Checkpointer::new(CheckpointerConfig::new(dir.path(), "dqn"));
        let id = AgentId::from("a");

        let replay = shared_replay(10);
        replay.append(trajectory(-4.0));
        replay.append(trajectory(-12.0));
        ck.save_replay(&id, &replay).unwrap();

        let restored = shared_replay(10);
        let stats = Arc::new(AgentStats::new(id.clone()));
        assert_eq!(ck.load_replay(&id, &restored, &stats).unwrap(), 2);
        assert_eq!(restored.snapshot(), replay.snapshot());
        assert_eq!(stats.reward_scale(), 12.0);
    }

    #[test]
    fn test_missing_replay_is_skipped() {
        let dir = tempdir().unwrap();
        let ck = Checkpointer::new(CheckpointerConfig::new(dir.path(), "dqn"));
        let id = AgentId::from("a");
        let replay = shared_replay(10);
        let stats = Arc::new(AgentStats::new(id.clone()));
        assert_eq!(ck.load_replay(&id, &replay, &stats).unwrap(), 0);
        assert!(replay.is_empty());
    }

    #[test]
    fn test_weights_roundtrip() {
        let dir = tempdir().unwrap();
        let ck = Checkpointer::new(CheckpointerConfig::new(dir.path(), "ddpg"));
        let id = AgentId::from("a");
        let dims = NetworkDims::new(5, 1);

        let AgentNetworks::Continuous { policy: a, critic: Some(critic) } =
            factory().build(AgentKind::Continuous, dims, true)
        else {
            unreachable!()
        };
        ck.save_net(&id, "policy", a.as_ref()).unwrap();
        ck.save_net(&id, "critic", critic.as_ref()).unwrap();
        assert!(ck.weights_path(&id, "critic", NetRole::Target).exists());

        let mut loaded = factory().build(AgentKind::Continuous, dims, true);
        ck.load_networks(&id, &mut loaded).unwrap();

        let AgentNetworks::Continuous { policy: b, .. } = &loaded else {
            unreachable!()
        };
        let state = vec![vec![0.1, 0.2, 0.3, 0.4, 0.5]];
        assert_eq!(
            a.forward(&state, NetRole::Online).unwrap(),
            b.forward(&state, NetRole::Online).unwrap()
        );
    }

    #[test]
    fn test_missing_weights_is_error() {
        let dir = tempdir().unwrap();
        let ck = Checkpointer::new(CheckpointerConfig::new(dir.path(), "dqn"));
        let mut nets = factory().build(AgentKind::Discrete, NetworkDims::new(4, 2), false);
        let err = ck.load_networks(&AgentId::from("nope"), &mut nets);
        assert!(matches!(err, Err(TscError::MissingResource(_))));
    }
}
