//! Continuous agent: deterministic policy gradient over green durations.

use super::{build_step_batch, final_next_states, AgentCore};
use crate::core::{Action, NetRole, WeightKey};
use crate::error::{Result, TscError};
use crate::nn::{AgentNetworks, CriticFunction, PolicyFunction};

pub struct DdpgAgent {
    pub(super) core: AgentCore,
    pub(super) policy: Box<dyn PolicyFunction>,
    pub(super) critic: Option<Box<dyn CriticFunction>>,
}

/// Add uniform noise in `[-eps, eps]` to each component, clipped to [-1, 1].
fn perturb(mut action: Vec<f32>, eps: f32) -> Vec<f32> {
    if eps > 0.0 {
        for a in action.iter_mut() {
            *a += (fastrand::f32() * 2.0 - 1.0) * eps;
        }
    }
    action.into_iter().map(|a| a.clamp(-1.0, 1.0)).collect()
}

impl DdpgAgent {
    pub(super) fn new(
        core: AgentCore,
        policy: Box<dyn PolicyFunction>,
        critic: Option<Box<dyn CriticFunction>>,
    ) -> Self {
        Self {
            core,
            policy,
            critic,
        }
    }

    fn refresh_weights(&mut self) -> Result<()> {
        if let Some(msg) = self.core.newer_online_weights() {
            self.policy.set_weights(&msg.payload, NetRole::Online)?;
            self.core.held_version = msg.version;
        }
        Ok(())
    }

    /// Policy output plus exploration noise.
    pub fn get_action(&mut self, state: &[f32]) -> Result<Action> {
        self.refresh_weights()?;
        let out = self
            .policy
            .forward(&[state.to_vec()], NetRole::Online)?
            .into_iter()
            .next()
            .unwrap_or_else(|| vec![0.0]);
        Ok(Action::Continuous(perturb(out, self.core.effective_epsilon())))
    }

    pub fn train_batch(&mut self, target_update_period: u64) -> Result<Option<f32>> {
        let critic = self
            .critic
            .as_mut()
            .ok_or_else(|| TscError::network("continuous agent has no critic on this worker"))?;

        let sampled = self.core.replay.sample(self.core.config.batch_size);
        let (batch, next_states) = final_next_states(sampled);
        if batch.is_empty() {
            return Ok(None);
        }

        let next_actions = self.policy.forward(&next_states, NetRole::Target)?;
        let bootstrap = critic.forward(&next_states, &next_actions, NetRole::Target)?;

        let steps = build_step_batch(
            &batch,
            &bootstrap,
            self.core.config.gamma,
            self.core.stats.reward_scale(),
            |a: &Action| Some(a.to_vec()),
        )
        .subsample(self.core.config.batch_size);

        let loss = critic.backward(&steps.states, &steps.actions, &steps.returns)?;

        let mu = self.policy.forward(&steps.states, NetRole::Online)?;
        let dq_da = critic.action_gradients(&steps.states, &mu)?;
        self.policy.backward(&steps.states, &dq_da)?;

        let updates = self.core.finish_update();
        let stats = &self.core.stats;
        stats.publish_weights(WeightKey::POLICY_ONLINE, self.policy.get_weights(NetRole::Online)?);
        if self.core.target_sync_due(updates, target_update_period) {
            let tau = self.core.config.tau;
            self.policy.soft_update(tau)?;
            critic.soft_update(tau)?;
            stats.publish_weights(WeightKey::POLICY_TARGET, self.policy.get_weights(NetRole::Target)?);
            stats.publish_weights(WeightKey::CRITIC_ONLINE, critic.get_weights(NetRole::Online)?);
        }
        Ok(Some(loss))
    }

    pub(super) fn into_networks(self) -> AgentNetworks {
        AgentNetworks::Continuous {
            policy: self.policy,
            critic: self.critic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perturb_stays_in_range() {
        for _ in 0..100 {
            let a = perturb(vec![0.95, -0.95, 0.0], 0.5);
            assert!(a.iter().all(|v| (-1.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_perturb_without_noise_only_clips() {
        assert_eq!(perturb(vec![1.5, 0.25], 0.0), vec![1.0, 0.25]);
    }
}
