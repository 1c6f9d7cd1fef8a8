//! # emerald-rl-agent
//!
//! Tabular Q-learning agent for the Emerald-RL environment.
//!
//! This crate provides:
//! - `GameEnvironment` trait the emulator bridge implements
//! - Value table with durable save/load and tabular export
//! - ε-greedy and random policies
//! - Episode controller with reset, decay and persistence semantics
//! - Per-episode CSV step log

pub mod config;
pub mod controller;
pub mod environment;
pub mod policy;
pub mod step_log;
pub mod value_table;

pub use config::TrainerConfig;
pub use controller::{ControllerState, EpisodeController, RunSummary, TransitionContext};
pub use environment::GameEnvironment;
pub use policy::{EpsilonGreedyPolicy, LearningConfig, Policy, RandomPolicy};
pub use step_log::StepLog;
pub use value_table::{ActionValues, ValueTable};
