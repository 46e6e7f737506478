//! Experience and trajectory types produced by signal controllers.

use serde::{Deserialize, Serialize};

/// Action chosen by an agent (discrete phase index or continuous duration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Index into the intersection's green phases.
    Discrete(usize),
    /// Policy output in [-1, 1].
    Continuous(Vec<f32>),
}

impl Action {
    /// Discrete index, if this is a discrete action.
    pub fn as_discrete(&self) -> Option<usize> {
        match self {
            Action::Discrete(a) => Some(*a),
            Action::Continuous(_) => None,
        }
    }

    /// Continuous vector, if this is a continuous action.
    pub fn as_continuous(&self) -> Option<&[f32]> {
        match self {
            Action::Discrete(_) => None,
            Action::Continuous(a) => Some(a),
        }
    }

    /// Flattened numeric view used as critic input.
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            Action::Discrete(a) => vec![*a as f32],
            Action::Continuous(a) => a.clone(),
        }
    }
}

/// One decision interval: state, action, reward and the state that followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f32>,
    pub action: Action,
    pub next_state: Vec<f32>,
    pub reward: f32,
    pub terminal: bool,
}

impl Experience {
    pub fn new(
        state: Vec<f32>,
        action: Action,
        next_state: Vec<f32>,
        reward: f32,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            next_state,
            reward,
            terminal,
        }
    }
}

/// Ordered run of experiences between two flush points.
///
/// Holds at most the n-step horizon of steps and ends early on a terminal
/// step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<Experience>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n_steps: usize) -> Self {
        Self {
            steps: Vec::with_capacity(n_steps),
        }
    }

    pub fn from_steps(steps: Vec<Experience>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, exp: Experience) {
        self.steps.push(exp);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Experience] {
        &self.steps
    }

    pub fn last(&self) -> Option<&Experience> {
        self.steps.last()
    }

    /// Whether the final step ended the episode.
    pub fn is_terminal(&self) -> bool {
        self.steps.last().map(|e| e.terminal).unwrap_or(false)
    }

    /// Largest absolute reward in the trajectory.
    pub fn max_abs_reward(&self) -> f32 {
        self.steps
            .iter()
            .map(|e| e.reward.abs())
            .fold(0.0, f32::max)
    }

    /// Discounted returns for every step, bootstrapped from `bootstrap`.
    ///
    /// ```text
    /// R_T = bootstrap
    /// R_t = r_t / scale + gamma * R_{t+1}
    /// ```
    pub fn discounted_returns(&self, bootstrap: f32, gamma: f32, scale: f32) -> Vec<f32> {
        let mut returns = vec![0.0; self.steps.len()];
        let mut acc = bootstrap;
        for (i, exp) in self.steps.iter().enumerate().rev() {
            acc = exp.reward / scale + gamma * acc;
            returns[i] = acc;
        }
        returns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(reward: f32, terminal: bool) -> Experience {
        Experience::new(vec![0.0], Action::Discrete(0), vec![1.0], reward, terminal)
    }

    #[test]
    fn test_action_accessors() {
        assert_eq!(Action::Discrete(3).as_discrete(), Some(3));
        assert_eq!(Action::Discrete(3).as_continuous(), None);
        assert_eq!(Action::Continuous(vec![0.5]).as_continuous(), Some(&[0.5][..]));
        assert_eq!(Action::Continuous(vec![0.5]).to_vec(), vec![0.5]);
    }

    #[test]
    fn test_discounted_returns_single_step() {
        let t = Trajectory::from_steps(vec![exp(-2.0, false)]);
        let r = t.discounted_returns(10.0, 0.5, 2.0);
        assert!((r[0] - (-1.0 + 5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_discounted_returns_multi_step() {
        let t = Trajectory::from_steps(vec![exp(1.0, false), exp(1.0, false), exp(1.0, true)]);
        let r = t.discounted_returns(0.0, 0.5, 1.0);
        assert!((r[2] - 1.0).abs() < 1e-6);
        assert!((r[1] - 1.5).abs() < 1e-6);
        assert!((r[0] - 1.75).abs() < 1e-6);
    }

    #[test]
    fn test_terminal_and_max_reward() {
        let t = Trajectory::from_steps(vec![exp(-7.0, false), exp(3.0, true)]);
        assert!(t.is_terminal());
        assert_eq!(t.max_abs_reward(), 7.0);
        assert!(!Trajectory::new().is_terminal());
    }
}
