//! Reward shaping: novelty bonus, one-shot map goals, per-step cost

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::observation::Observation;
use crate::state::{PositionKey, position_key};

/// A map that pays out once per episode when first entered
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoalLocation {
    pub map_bank: i32,
    pub map_num: i32,
    pub reward: f64,
}

impl GoalLocation {
    pub fn new(map_bank: i32, map_num: i32, reward: f64) -> Self {
        Self {
            map_bank,
            map_num,
            reward,
        }
    }

    fn matches(&self, obs: &Observation) -> bool {
        self.map_bank == obs.map_bank && self.map_num == obs.map_num
    }
}

/// Reward shaping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RewardConfig {
    /// Bonus for the first visit to a tile
    pub tile_bonus: f64,
    /// Cost subtracted on every step
    pub step_cost: f64,
    /// Goals re-seeded at every reset
    pub goals: Vec<GoalLocation>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            tile_bonus: 1.0,
            step_cost: 0.1,
            goals: default_goals(),
        }
    }
}

fn default_goals() -> Vec<GoalLocation> {
    vec![GoalLocation::new(0, 16, 50.0), GoalLocation::new(1, 0, 25.0)]
}

/// Stateful reward accumulator for one episode
#[derive(Debug, Clone)]
pub struct RewardShaper {
    config: RewardConfig,
    visited_tiles: HashSet<PositionKey>,
    pending_goals: Vec<GoalLocation>,
    visited_goals: Vec<GoalLocation>,
    reward: f64,
}

impl RewardShaper {
    /// Create a shaper with the goal set seeded from `config`
    pub fn new(config: RewardConfig) -> Self {
        let pending_goals = config.goals.clone();
        Self {
            config,
            visited_tiles: HashSet::new(),
            pending_goals,
            visited_goals: Vec::new(),
            reward: 0.0,
        }
    }

    /// Score one observation and return the cumulative reward
    pub fn on_step(&mut self, obs: &Observation) -> f64 {
        if self.visited_tiles.insert(position_key(obs)) {
            self.reward += self.config.tile_bonus;
        }

        // At most one goal per call
        if let Some(i) = self.pending_goals.iter().position(|g| g.matches(obs)) {
            let goal = self.pending_goals.remove(i);
            info!(
                "Goal reached: bank {} map {} (+{})",
                goal.map_bank, goal.map_num, goal.reward
            );
            self.reward += goal.reward;
            self.visited_goals.push(goal);
        }

        self.charge_step_cost()
    }

    /// Apply only the per-step cost and return the cumulative reward
    ///
    /// Used for steps whose observation was an error.
    pub fn charge_step_cost(&mut self) -> f64 {
        self.reward -= self.config.step_cost;
        debug!("Cumulative reward: {:.2}", self.reward);
        self.reward
    }

    /// Current cumulative reward
    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// Number of distinct tiles visited this episode
    pub fn tiles_visited(&self) -> usize {
        self.visited_tiles.len()
    }

    /// Goals consumed this episode, in the order they were reached
    pub fn goals_reached(&self) -> &[GoalLocation] {
        &self.visited_goals
    }

    /// Goals still available this episode
    pub fn pending_goals(&self) -> &[GoalLocation] {
        &self.pending_goals
    }

    /// Start a new episode
    pub fn reset(&mut self) {
        self.visited_tiles.clear();
        self.visited_goals.clear();
        self.pending_goals = self.config.goals.clone();
        self.reward = 0.0;
    }
}

impl Default for RewardShaper {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}
