//! Action-selection policies
//!
//! [`EpsilonGreedyPolicy`] is the learning agent. [`RandomPolicy`] is a
//! baseline that never learns but still carries a table so the controller
//! can persist it the same way.

use emerald_rl_core::{ACTION_COUNT, Action, AgentError, PolicyState, Result};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::value_table::ValueTable;

/// Trait for policies driven by the episode controller
pub trait Policy: Send {
    /// Pick the next action at `state`
    fn choose_action(&mut self, state: &PolicyState) -> Action;

    /// Learn from one `(s, a, r, s')` transition
    fn learn(&mut self, state: &PolicyState, action: Action, reward: f64, next_state: &PolicyState);

    /// Shrink the exploration rate by one step
    fn decay_epsilon(&mut self);

    /// Current exploration rate
    fn epsilon(&self) -> f64;

    fn value_table(&self) -> &ValueTable;

    fn value_table_mut(&mut self) -> &mut ValueTable;
}

/// Learning hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LearningConfig {
    /// Learning rate α
    pub alpha: f64,
    /// Discount factor γ
    pub gamma: f64,
    /// Initial exploration rate
    pub epsilon: f64,
    /// Exploration floor
    pub epsilon_min: f64,
    /// Multiplicative decay applied once per step
    pub epsilon_decay: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.99,
            epsilon: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.9995,
            seed: None,
        }
    }
}

impl LearningConfig {
    /// Reject parameters that would break convergence or monotone decay
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(AgentError::Config(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(AgentError::Config(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(AgentError::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon_min) || !(0.0..=1.0).contains(&self.epsilon) {
            return Err(AgentError::Config(format!(
                "epsilon ({}) and epsilon_min ({}) must be in [0, 1]",
                self.epsilon, self.epsilon_min
            )));
        }
        Ok(())
    }
}

fn build_rng(seed: Option<u64>) -> StdRng {
    if let Some(seed) = seed {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_rng(&mut rand::rng())
    }
}

fn random_action(rng: &mut StdRng) -> Action {
    Action::ALL[rng.random_range(0..ACTION_COUNT)]
}

/// ε-greedy tabular Q-learning agent
#[derive(Debug)]
pub struct EpsilonGreedyPolicy {
    table: ValueTable,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    epsilon_min: f64,
    epsilon_decay: f64,
    rng: StdRng,
}

impl EpsilonGreedyPolicy {
    /// Create an agent over `table`
    pub fn new(config: &LearningConfig, table: ValueTable) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table,
            alpha: config.alpha,
            gamma: config.gamma,
            epsilon: config.epsilon,
            epsilon_min: config.epsilon_min,
            epsilon_decay: config.epsilon_decay,
            rng: build_rng(config.seed),
        })
    }

    pub fn epsilon_min(&self) -> f64 {
        self.epsilon_min
    }

    /// Force the exploration rate, e.g. to 0 for evaluation
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }
}

impl Policy for EpsilonGreedyPolicy {
    fn choose_action(&mut self, state: &PolicyState) -> Action {
        if self.rng.random::<f64>() < self.epsilon {
            let action = random_action(&mut self.rng);
            trace!("Explore: {}", action);
            return action;
        }

        // Ties resolve to the lowest ordinal; see ActionValues::best_action
        let action = self.table.row(state).best_action();
        trace!("Exploit: {}", action);
        action
    }

    fn learn(&mut self, state: &PolicyState, action: Action, reward: f64, next_state: &PolicyState) {
        self.table
            .update(state, action, reward, next_state, self.alpha, self.gamma);
    }

    fn decay_epsilon(&mut self) {
        if self.epsilon > self.epsilon_min {
            self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
            debug!("Epsilon decayed to {:.5}", self.epsilon);
        }
    }

    fn epsilon(&self) -> f64 {
        self.epsilon
    }

    fn value_table(&self) -> &ValueTable {
        &self.table
    }

    fn value_table_mut(&mut self) -> &mut ValueTable {
        &mut self.table
    }
}

/// Uniform random baseline
#[derive(Debug)]
pub struct RandomPolicy {
    table: ValueTable,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(table: ValueTable, seed: Option<u64>) -> Self {
        Self {
            table,
            rng: build_rng(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn choose_action(&mut self, _state: &PolicyState) -> Action {
        random_action(&mut self.rng)
    }

    fn learn(&mut self, _state: &PolicyState, _action: Action, _reward: f64, _next: &PolicyState) {}

    fn decay_epsilon(&mut self) {}

    fn epsilon(&self) -> f64 {
        1.0
    }

    fn value_table(&self) -> &ValueTable {
        &self.table
    }

    fn value_table_mut(&mut self) -> &mut ValueTable {
        &mut self.table
    }
}
