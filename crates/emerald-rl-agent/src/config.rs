//! Trainer configuration

use emerald_rl_core::RewardConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::policy::LearningConfig;

/// Where the episode controller persists its outputs, and its retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TrainerConfig {
    /// Value table loaded at startup and overwritten at episode end
    pub table_path: PathBuf,
    /// Directory for timestamped tabular snapshots
    pub snapshot_dir: PathBuf,
    /// Directory for per-episode step logs
    pub log_dir: PathBuf,
    /// Consecutive error observations tolerated before aborting the run
    pub max_consecutive_errors: u32,
    /// Truncate an episode after this many learned steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps_per_episode: Option<u64>,
    /// Learning hyperparameters
    pub learning: LearningConfig,
    /// Reward shaping
    pub reward: RewardConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("QTables/qTable.msgpack"),
            snapshot_dir: PathBuf::from("QTables/LogQTables"),
            log_dir: PathBuf::from("Logging"),
            max_consecutive_errors: 50,
            max_steps_per_episode: None,
            learning: LearningConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}
