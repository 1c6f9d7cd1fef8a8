//! mGBA bridge for emerald-rl
//!
//! Talks to the Lua script running inside mGBA over a newline-terminated
//! ASCII protocol on TCP:
//!
//! - **Commands**: `PING`, `RESET`, `GETSTATE`, `STEP:<BUTTON>`
//! - **Replies**: `PONG`, `RESET_OK`, `STATE:<fields>`, `ERROR:<reason>`
//!
//! [`MgbaClient`] implements [`emerald_rl_agent::GameEnvironment`] so the
//! episode controller can drive the emulator directly.

mod client;
pub mod protocol;

pub use client::{MgbaClient, MgbaConfig, Ready};
pub use protocol::{Command, Reply, parse_reply};
