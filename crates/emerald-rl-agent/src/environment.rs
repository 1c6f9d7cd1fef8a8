//! Game environment trait

use async_trait::async_trait;
use emerald_rl_core::{Button, Observation, Result};

/// Capability the episode controller drives
///
/// Recoverable failures (timeouts, malformed replies, emulator `ERROR:`)
/// come back as `Ok` with an error [`Observation`]; callers must check
/// [`Observation::is_error`]. `Err` is reserved for connection loss.
#[async_trait]
pub trait GameEnvironment: Send {
    /// Re-seed the emulator to its fixed save state; `false` if refused
    async fn reset(&mut self) -> Result<bool>;

    /// Observe without acting
    async fn get_state(&mut self) -> Result<Observation>;

    /// Press one button and observe the result
    async fn step(&mut self, button: Button) -> Result<Observation>;

    /// Liveness check
    async fn ping(&mut self) -> Result<bool>;

    /// Release the connection; safe to call more than once
    async fn disconnect(&mut self);
}
