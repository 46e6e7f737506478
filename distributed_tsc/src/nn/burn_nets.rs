//! Burn implementations of the approximator traits.
//!
//! Each network keeps an online [`Mlp`] and, on learner-side instances, a
//! target copy. Parameters travel between workers as `BinBytesRecorder`
//! bytes and are checkpointed with `BinFileRecorder`.

use crate::core::NetRole;
use crate::error::{Result, TscError};
use crate::nn::mlp::{column_tensor, rows_to_tensor, scalar, tensor_to_rows, Mlp, MlpConfig};
use crate::nn::soft_update::soft_update;
use crate::nn::{CriticFunction, PolicyFunction, QFunction, WeightTransfer};
use burn::module::Module;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, BinFileRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::activation::tanh;
use burn::tensor::backend::AutodiffBackend;
use std::path::Path;

fn recorder_error(e: RecorderError) -> TscError {
    TscError::Network(format!("recorder: {:?}", e))
}

/// Online network plus optional target copy.
pub struct NetPair<B: Backend> {
    online: Mlp<B>,
    target: Option<Mlp<B>>,
    device: B::Device,
}

impl<B: Backend> NetPair<B> {
    pub fn new(config: &MlpConfig, with_target: bool, device: &B::Device) -> Self {
        let online = config.init::<B>(device);
        let target = with_target.then(|| online.clone());
        Self {
            online,
            target,
            device: device.clone(),
        }
    }

    pub fn model(&self, role: NetRole) -> Result<&Mlp<B>> {
        match role {
            NetRole::Online => Ok(&self.online),
            NetRole::Target => self
                .target
                .as_ref()
                .ok_or_else(|| TscError::network("network has no target copy")),
        }
    }

    fn replace(&mut self, role: NetRole, model: Mlp<B>) -> Result<()> {
        match role {
            NetRole::Online => self.online = model,
            NetRole::Target => {
                if self.target.is_none() {
                    return Err(TscError::network("network has no target copy"));
                }
                self.target = Some(model);
            }
        }
        Ok(())
    }

    pub fn hard_sync(&mut self) -> Result<()> {
        if self.target.is_none() {
            return Err(TscError::network("network has no target copy"));
        }
        self.target = Some(self.online.clone());
        Ok(())
    }

    pub fn soft_sync(&mut self, tau: f32) -> Result<()> {
        let target = self
            .target
            .take()
            .ok_or_else(|| TscError::network("network has no target copy"))?;
        self.target = Some(soft_update(&self.online, target, tau));
        Ok(())
    }

    fn get_weights(&self, role: NetRole) -> Result<Vec<u8>> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        recorder
            .record(self.model(role)?.clone().into_record(), ())
            .map_err(recorder_error)
    }

    fn set_weights(&mut self, weights: &[u8], role: NetRole) -> Result<()> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(weights.to_vec(), &self.device)
            .map_err(recorder_error)?;
        let model = self.model(role)?.clone().load_record(record);
        self.replace(role, model)
    }

    fn save(&self, role: NetRole, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model(role)?
            .clone()
            .save_file(path, &recorder)
            .map_err(recorder_error)
    }

    fn load(&mut self, path: &Path, role: NetRole) -> Result<()> {
        if !path.exists() {
            return Err(TscError::MissingResource(path.to_path_buf()));
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = self
            .model(role)?
            .clone()
            .load_file(path, &recorder, &self.device)
            .map_err(recorder_error)?;
        self.replace(role, model)
    }
}

macro_rules! delegate_weight_transfer {
    ($ty:ident) => {
        impl<B, O> WeightTransfer for $ty<B, O>
        where
            B: AutodiffBackend,
            O: Optimizer<Mlp<B>, B>,
        {
            fn get_weights(&self, role: NetRole) -> Result<Vec<u8>> {
                self.nets.get_weights(role)
            }

            fn set_weights(&mut self, weights: &[u8], role: NetRole) -> Result<()> {
                self.nets.set_weights(weights, role)
            }

            fn save(&self, role: NetRole, path: &Path) -> Result<()> {
                self.nets.save(role, path)
            }

            fn load(&mut self, path: &Path, role: NetRole) -> Result<()> {
                self.nets.load(path, role)
            }

            fn has_target(&self) -> bool {
                self.nets.target.is_some()
            }
        }
    };
}

// ============================================================================
// Q-network (discrete agents)
// ============================================================================

/// Q-network with one output per green phase.
pub struct BurnQNetwork<B: AutodiffBackend, O> {
    nets: NetPair<B>,
    optim: O,
    lr: f64,
}

/// Build a Q-network trained with Adam. `learner` adds the target copy.
pub fn q_network<B: AutodiffBackend>(
    config: &MlpConfig,
    lr: f64,
    epsilon: f32,
    learner: bool,
    device: &B::Device,
) -> BurnQNetwork<B, impl Optimizer<Mlp<B>, B>> {
    BurnQNetwork {
        nets: NetPair::new(config, learner, device),
        optim: AdamConfig::new().with_epsilon(epsilon).init::<B, Mlp<B>>(),
        lr,
    }
}

impl<B, O> QFunction for BurnQNetwork<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Mlp<B>, B>,
{
    fn forward(&self, states: &[Vec<f32>], role: NetRole) -> Result<Vec<Vec<f32>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let x = rows_to_tensor::<B>(states, &self.nets.device);
        tensor_to_rows(self.nets.model(role)?.forward(x))
    }

    fn backward(&mut self, states: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<f32> {
        if states.is_empty() {
            return Ok(0.0);
        }
        let device = &self.nets.device;
        let x = rows_to_tensor::<B>(states, device);
        let y = rows_to_tensor::<B>(targets, device);

        let pred = self.nets.online.forward(x);
        let loss = (pred - y).powf_scalar(2.0).mean();
        let loss_value = scalar(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), &self.nets.online);
        self.nets.online = self.optim.step(self.lr, self.nets.online.clone(), grads);
        Ok(loss_value)
    }

    fn transfer_weights(&mut self) -> Result<()> {
        self.nets.hard_sync()
    }
}

delegate_weight_transfer!(BurnQNetwork);

// ============================================================================
// Deterministic policy (continuous agents)
// ============================================================================

/// Policy network with tanh-squashed output.
pub struct BurnPolicy<B: AutodiffBackend, O> {
    nets: NetPair<B>,
    optim: O,
    lr: f64,
}

/// Build a policy network trained with Adam. `learner` adds the target copy.
pub fn policy_network<B: AutodiffBackend>(
    config: &MlpConfig,
    lr: f64,
    epsilon: f32,
    learner: bool,
    device: &B::Device,
) -> BurnPolicy<B, impl Optimizer<Mlp<B>, B>> {
    BurnPolicy {
        nets: NetPair::new(config, learner, device),
        optim: AdamConfig::new().with_epsilon(epsilon).init::<B, Mlp<B>>(),
        lr,
    }
}

impl<B, O> PolicyFunction for BurnPolicy<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Mlp<B>, B>,
{
    fn forward(&self, states: &[Vec<f32>], role: NetRole) -> Result<Vec<Vec<f32>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let x = rows_to_tensor::<B>(states, &self.nets.device);
        tensor_to_rows(tanh(self.nets.model(role)?.forward(x)))
    }

    fn backward(&mut self, states: &[Vec<f32>], action_grads: &[Vec<f32>]) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }
        let device = &self.nets.device;
        let n = states.len() as f32;
        let x = rows_to_tensor::<B>(states, device);
        let dq_da = rows_to_tensor::<B>(action_grads, device);

        let actions = tanh(self.nets.online.forward(x));
        let loss = (actions * dq_da).sum().mul_scalar(-1.0 / n);

        let grads = GradientsParams::from_grads(loss.backward(), &self.nets.online);
        self.nets.online = self.optim.step(self.lr, self.nets.online.clone(), grads);
        Ok(())
    }

    fn soft_update(&mut self, tau: f32) -> Result<()> {
        self.nets.soft_sync(tau)
    }
}

delegate_weight_transfer!(BurnPolicy);

// ============================================================================
// Critic (continuous agents, learner only)
// ============================================================================

/// Q(s, a) network over the concatenated state and action.
pub struct BurnCritic<B: AutodiffBackend, O> {
    nets: NetPair<B>,
    optim: O,
    lr: f64,
}

/// Build a critic trained with Adam. Critics always carry a target copy.
pub fn critic_network<B: AutodiffBackend>(
    config: &MlpConfig,
    lr: f64,
    epsilon: f32,
    device: &B::Device,
) -> BurnCritic<B, impl Optimizer<Mlp<B>, B>> {
    BurnCritic {
        nets: NetPair::new(config, true, device),
        optim: AdamConfig::new().with_epsilon(epsilon).init::<B, Mlp<B>>(),
        lr,
    }
}

impl<B, O> CriticFunction for BurnCritic<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Mlp<B>, B>,
{
    fn forward(&self, states: &[Vec<f32>], actions: &[Vec<f32>], role: NetRole) -> Result<Vec<f32>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let device = &self.nets.device;
        let s = rows_to_tensor::<B>(states, device);
        let a = rows_to_tensor::<B>(actions, device);
        let q = tensor_to_rows(self.nets.model(role)?.forward(Tensor::cat(vec![s, a], 1)))?;
        Ok(q.into_iter().map(|row| row[0]).collect())
    }

    fn backward(&mut self, states: &[Vec<f32>], actions: &[Vec<f32>], targets: &[f32]) -> Result<f32> {
        if states.is_empty() {
            return Ok(0.0);
        }
        let device = &self.nets.device;
        let s = rows_to_tensor::<B>(states, device);
        let a = rows_to_tensor::<B>(actions, device);
        let y = column_tensor::<B>(targets, device);

        let q = self.nets.online.forward(Tensor::cat(vec![s, a], 1));
        let loss = (q - y).powf_scalar(2.0).mean();
        let loss_value = scalar(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), &self.nets.online);
        self.nets.online = self.optim.step(self.lr, self.nets.online.clone(), grads);
        Ok(loss_value)
    }

    fn action_gradients(&self, states: &[Vec<f32>], actions: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let device = &self.nets.device;
        let s = rows_to_tensor::<B>(states, device);
        let a = rows_to_tensor::<B>(actions, device).require_grad();

        let q = self.nets.online.forward(Tensor::cat(vec![s, a.clone()], 1));
        let grads = q.sum().backward();
        let dq_da = a
            .grad(&grads)
            .ok_or_else(|| TscError::network("no gradient for critic action input"))?;
        tensor_to_rows(dq_da)
    }

    fn soft_update(&mut self, tau: f32) -> Result<()> {
        self.nets.soft_sync(tau)
    }
}

delegate_weight_transfer!(BurnCritic);
