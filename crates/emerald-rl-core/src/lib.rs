//! # emerald-rl-core
//!
//! Core types for the Emerald-RL agent.
//!
//! This crate provides the foundational types shared by the agent and the
//! emulator bridge:
//! - Button vocabulary, policy actions and facing directions
//! - Observations, including the error observation
//! - Canonical policy-state encoding
//! - Reward shaping
//! - Error taxonomy

pub mod action;
pub mod error;
pub mod observation;
pub mod reward;
pub mod state;

pub use action::{ACTION_COUNT, Action, Button, Direction};
pub use error::{AgentError, Result};
pub use observation::{Observation, ObservationFault};
pub use reward::{GoalLocation, RewardConfig, RewardShaper};
pub use state::{PolicyState, PositionKey, direction_code, encode, position_key};
