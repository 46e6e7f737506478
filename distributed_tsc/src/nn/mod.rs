//! Function approximators used by agents.
//!
//! Agents only see the traits in this module. The burn implementations live
//! in [`burn_nets`]; tests substitute lightweight doubles.
//!
//! | Trait              | Discrete agent | Continuous agent (actor) | Continuous agent (learner) |
//! |--------------------|----------------|--------------------------|----------------------------|
//! | [`QFunction`]      | online, target |                          |                            |
//! | [`PolicyFunction`] |                | online                   | online, target             |
//! | [`CriticFunction`] |                |                          | online, target             |

pub mod burn_nets;
pub mod factory;
pub mod mlp;
pub mod soft_update;

use crate::core::NetRole;
use crate::error::Result;
use std::path::Path;

pub use factory::{AgentNetworks, BurnNetworkFactory, DefaultBackend, NetworkDims, NetworkFactory};

/// Parameter transfer shared by every approximator.
pub trait WeightTransfer {
    /// Serialise the parameters of `role`.
    fn get_weights(&self, role: NetRole) -> Result<Vec<u8>>;

    /// Replace the parameters of `role` with serialised ones.
    fn set_weights(&mut self, weights: &[u8], role: NetRole) -> Result<()>;

    /// Write the parameters of `role` to `path`.
    fn save(&self, role: NetRole, path: &Path) -> Result<()>;

    /// Read parameters from `path` into `role`.
    ///
    /// Fails with `MissingResource` when the file does not exist.
    fn load(&mut self, path: &Path, role: NetRole) -> Result<()>;

    /// Whether a target copy exists (learner-side instances only).
    fn has_target(&self) -> bool;
}

/// State-action value estimator with one output per discrete action.
pub trait QFunction: WeightTransfer + Send {
    fn forward(&self, states: &[Vec<f32>], role: NetRole) -> Result<Vec<Vec<f32>>>;

    /// One gradient step of the online network toward `targets`. Returns the loss.
    fn backward(&mut self, states: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<f32>;

    /// Hard copy online parameters into the target network.
    fn transfer_weights(&mut self) -> Result<()>;
}

/// Deterministic policy with outputs in [-1, 1].
pub trait PolicyFunction: WeightTransfer + Send {
    fn forward(&self, states: &[Vec<f32>], role: NetRole) -> Result<Vec<Vec<f32>>>;

    /// Ascend the critic along `action_grads` (dQ/da evaluated at the policy output).
    fn backward(&mut self, states: &[Vec<f32>], action_grads: &[Vec<f32>]) -> Result<()>;

    /// Blend online parameters into the target: `target = tau*online + (1-tau)*target`.
    fn soft_update(&mut self, tau: f32) -> Result<()>;
}

/// Action-value estimator Q(s, a) for continuous actions.
pub trait CriticFunction: WeightTransfer + Send {
    fn forward(&self, states: &[Vec<f32>], actions: &[Vec<f32>], role: NetRole) -> Result<Vec<f32>>;

    /// One gradient step of the online critic toward `targets`. Returns the loss.
    fn backward(&mut self, states: &[Vec<f32>], actions: &[Vec<f32>], targets: &[f32])
        -> Result<f32>;

    /// dQ/da of the online critic at `(states, actions)`.
    fn action_gradients(&self, states: &[Vec<f32>], actions: &[Vec<f32>]) -> Result<Vec<Vec<f32>>>;

    fn soft_update(&mut self, tau: f32) -> Result<()>;
}
