//! Discrete agent: n-step deep Q-learning over green phases.

use super::{build_step_batch, final_next_states, AgentCore};
use crate::core::{Action, NetRole, WeightKey};
use crate::error::Result;
use crate::nn::{AgentNetworks, QFunction};

pub struct DqnAgent {
    pub(super) core: AgentCore,
    pub(super) q: Box<dyn QFunction>,
    n_actions: usize,
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

fn max_value(values: &[f32]) -> f32 {
    values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

impl DqnAgent {
    pub(super) fn new(core: AgentCore, q: Box<dyn QFunction>, n_actions: usize) -> Self {
        Self {
            core,
            q,
            n_actions: n_actions.max(1),
        }
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn refresh_weights(&mut self) -> Result<()> {
        if let Some(msg) = self.core.newer_online_weights() {
            self.q.set_weights(&msg.payload, NetRole::Online)?;
            self.core.held_version = msg.version;
        }
        Ok(())
    }

    /// Epsilon-greedy over the online Q-values.
    pub fn get_action(&mut self, state: &[f32]) -> Result<Action> {
        if fastrand::f32() < self.core.effective_epsilon() {
            return Ok(Action::Discrete(fastrand::usize(0..self.n_actions)));
        }
        self.refresh_weights()?;
        let q = self.q.forward(&[state.to_vec()], NetRole::Online)?;
        let best = q.first().map(|row| argmax(row)).unwrap_or(0);
        Ok(Action::Discrete(best.min(self.n_actions - 1)))
    }

    pub fn train_batch(&mut self, target_update_period: u64) -> Result<Option<f32>> {
        let sampled = self.core.replay.sample(self.core.config.batch_size);
        let (batch, next_states) = final_next_states(sampled);
        if batch.is_empty() {
            return Ok(None);
        }

        let bootstrap: Vec<f32> = self
            .q
            .forward(&next_states, NetRole::Target)?
            .iter()
            .map(|row| max_value(row))
            .collect();

        let steps = build_step_batch(
            &batch,
            &bootstrap,
            self.core.config.gamma,
            self.core.stats.reward_scale(),
            Action::as_discrete,
        )
        .subsample(self.core.config.batch_size);

        // Only the taken action's output moves; the rest regress onto the
        // network's own prediction.
        let mut targets = self.q.forward(&steps.states, NetRole::Online)?;
        for (row, (&a, &ret)) in targets.iter_mut().zip(steps.actions.iter().zip(&steps.returns)) {
            if let Some(v) = row.get_mut(a) {
                *v = ret;
            }
        }
        let loss = self.q.backward(&steps.states, &targets)?;

        let updates = self.core.finish_update();
        let stats = &self.core.stats;
        stats.publish_weights(WeightKey::POLICY_ONLINE, self.q.get_weights(NetRole::Online)?);
        if self.core.target_sync_due(updates, target_update_period) {
            self.q.transfer_weights()?;
            stats.publish_weights(WeightKey::POLICY_TARGET, self.q.get_weights(NetRole::Target)?);
        }
        Ok(Some(loss))
    }

    pub(super) fn into_networks(self) -> AgentNetworks {
        AgentNetworks::Discrete { q: self.q }
    }
}
