//! Construction of per-agent networks.

use crate::agents::AgentKind;
use crate::config::NnConfig;
use crate::nn::burn_nets::{critic_network, policy_network, q_network};
use crate::nn::mlp::MlpConfig;
use crate::nn::{CriticFunction, PolicyFunction, QFunction};
use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::AutodiffBackend;
use std::marker::PhantomData;

/// Input and output widths of an agent's policy network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDims {
    pub input: usize,
    pub output: usize,
}

impl NetworkDims {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }
}

/// Networks owned by one agent.
pub enum AgentNetworks {
    Discrete {
        q: Box<dyn QFunction>,
    },
    Continuous {
        policy: Box<dyn PolicyFunction>,
        /// Present on learner-side instances only.
        critic: Option<Box<dyn CriticFunction>>,
    },
}

impl AgentNetworks {
    pub fn kind(&self) -> AgentKind {
        match self {
            AgentNetworks::Discrete { .. } => AgentKind::Discrete,
            AgentNetworks::Continuous { .. } => AgentKind::Continuous,
        }
    }
}

/// Builds networks inside worker threads.
pub trait NetworkFactory: Send + Sync {
    /// Build the networks of one agent. `learner` adds target copies and,
    /// for continuous agents, the critic.
    fn build(&self, kind: AgentKind, dims: NetworkDims, learner: bool) -> AgentNetworks;
}

/// Default training backend.
pub type DefaultBackend = Autodiff<NdArray<f32>>;

/// Burn MLP networks with `hidden_layers` layers of `input * hidden_scale` units.
pub struct BurnNetworkFactory<B: AutodiffBackend = DefaultBackend> {
    config: NnConfig,
    _backend: PhantomData<fn() -> B>,
}

impl<B: AutodiffBackend> BurnNetworkFactory<B> {
    pub fn new(config: NnConfig) -> Self {
        Self {
            config,
            _backend: PhantomData,
        }
    }

    fn hidden(&self, input: usize) -> Vec<usize> {
        vec![(input * self.config.hidden_scale).max(1); self.config.hidden_layers]
    }
}

impl<B: AutodiffBackend> NetworkFactory for BurnNetworkFactory<B> {
    fn build(&self, kind: AgentKind, dims: NetworkDims, learner: bool) -> AgentNetworks {
        let device = B::Device::default();
        let cfg = &self.config;
        match kind {
            AgentKind::Discrete => {
                let mlp = MlpConfig::new(dims.input, self.hidden(dims.input), dims.output);
                AgentNetworks::Discrete {
                    q: Box::new(q_network::<B>(&mlp, cfg.lr, cfg.optimizer_eps, learner, &device)),
                }
            }
            AgentKind::Continuous => {
                let mlp = MlpConfig::new(dims.input, self.hidden(dims.input), dims.output);
                let policy = Box::new(policy_network::<B>(
                    &mlp,
                    cfg.lr,
                    cfg.optimizer_eps,
                    learner,
                    &device,
                ));
                let critic = learner.then(|| {
                    let critic_input = dims.input + dims.output;
                    let mlp = MlpConfig::new(critic_input, self.hidden(critic_input), 1);
                    Box::new(critic_network::<B>(&mlp, cfg.lr_critic, cfg.optimizer_eps, &device))
                        as Box<dyn CriticFunction>
                });
                AgentNetworks::Continuous { policy, critic }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NetRole;

    fn factory() -> BurnNetworkFactory {
        BurnNetworkFactory::new(NnConfig {
            hidden_scale: 1,
            ..NnConfig::default()
        })
    }

    #[test]
    fn test_discrete_learner_has_target() {
        let nets = factory().build(AgentKind::Discrete, NetworkDims::new(7, 2), true);
        assert_eq!(nets.kind(), AgentKind::Discrete);
        let AgentNetworks::Discrete { q } = nets else {
            panic!("expected discrete networks");
        };
        assert!(q.has_target());
        let out = q.forward(&[vec![0.0; 7]], NetRole::Online).unwrap();
        assert_eq!(out[0].len(), 2);
    }

    #[test]
    fn test_continuous_actor_has_no_critic() {
        let nets = factory().build(AgentKind::Continuous, NetworkDims::new(7, 1), false);
        let AgentNetworks::Continuous { policy, critic } = nets else {
            panic!("expected continuous networks");
        };
        assert!(critic.is_none());
        assert!(!policy.has_target());
    }

    #[test]
    fn test_continuous_learner_has_critic() {
        let nets = factory().build(AgentKind::Continuous, NetworkDims::new(7, 1), true);
        let AgentNetworks::Continuous { critic, .. } = nets else {
            panic!("expected continuous networks");
        };
        let critic = critic.unwrap();
        let q = critic
            .forward(&[vec![0.0; 7]], &[vec![0.5]], NetRole::Target)
            .unwrap();
        assert_eq!(q.len(), 1);
    }
}
