//! Polyak averaging of module parameters.
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! Parameters are matched by traversal order, which is identical for two
//! modules built from the same configuration.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened.
struct Collect<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for Collect<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let numel: usize = val.dims().iter().product();
        self.params.push(val.reshape([numel]));
        param
    }
}

/// Rewrites each parameter as the blend with its collected counterpart.
struct Blend<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f32,
    next: usize,
}

impl<B: Backend> ModuleMapper<B> for Blend<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let idx = self.next;
        self.next += 1;

        let Some(online) = self.online.get(idx) else {
            return param;
        };

        let target = param.val();
        let shape = target.dims();
        let numel: usize = shape.iter().product();
        let blended = online.clone().mul_scalar(self.tau)
            + target.reshape([numel]).mul_scalar(1.0 - self.tau);

        // Detached so the target never joins the online autodiff graph.
        Param::initialized(param.id.clone(), blended.reshape(shape).detach())
    }
}

/// Blend `online` into `target` with coefficient `tau`.
///
/// `tau >= 1` is a hard copy, `tau <= 0` leaves the target untouched.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if tau >= 1.0 - 1e-6 {
        return online.clone();
    }
    if tau <= 1e-6 {
        return target;
    }

    let mut collect = Collect { params: Vec::new() };
    let _ = online.clone().map(&mut collect);

    let mut blend = Blend {
        online: collect.params,
        tau,
        next: 0,
    };
    target.map(&mut blend)
}
