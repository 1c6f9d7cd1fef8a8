//! Episode controller
//!
//! Drives one [`GameEnvironment`] with one [`Policy`]:
//!
//! ```text
//! IDLE --reset ok--> RUNNING --done--> TERMINATED --reset ok--> RUNNING ...
//! ```
//!
//! Each RUNNING step is `get_state → encode → choose → step → encode →
//! shape reward → learn → decay ε → log`. Cancellation is checked between
//! steps only, so an in-flight exchange always completes or times out first.
//! Every exit path persists the table, closes the step log and disconnects.

use emerald_rl_core::{
    Action, AgentError, Button, Observation, PolicyState, Result, RewardShaper, encode,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::TrainerConfig;
use crate::environment::GameEnvironment;
use crate::policy::Policy;
use crate::step_log::StepLog;

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Terminated,
}

/// State and action carried across one step so `learn` sees `(s, a, r, s')`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub state: PolicyState,
    pub action: Action,
}

/// What a run accomplished
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub episodes_completed: u64,
    pub total_steps: u64,
    pub final_epsilon: f64,
    /// Save, export or log writes that failed
    pub persistence_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Continue,
    Done,
    Truncated,
}

/// Runs episodes until cancelled or a fatal error occurs
pub struct EpisodeController<P: Policy> {
    config: TrainerConfig,
    policy: P,
    shaper: RewardShaper,
    state: ControllerState,
    context: Option<TransitionContext>,
    log: Option<StepLog>,
    run_ms: u128,
    episode: u64,
    episode_steps: u64,
    episodes_completed: u64,
    total_steps: u64,
    consecutive_errors: u32,
    persistence_failures: u32,
}

fn unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

impl<P: Policy> EpisodeController<P> {
    /// Create an idle controller
    pub fn new(config: TrainerConfig, policy: P) -> Self {
        let shaper = RewardShaper::new(config.reward.clone());
        Self {
            config,
            policy,
            shaper,
            state: ControllerState::Idle,
            context: None,
            log: None,
            run_ms: unix_ms(),
            episode: 0,
            episode_steps: 0,
            episodes_completed: 0,
            total_steps: 0,
            consecutive_errors: 0,
            persistence_failures: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn shaper(&self) -> &RewardShaper {
        &self.shaper
    }

    /// Last chosen `(state, action)`, if a step is in progress
    pub fn transition_context(&self) -> Option<TransitionContext> {
        self.context
    }

    /// Run episodes until `cancel` flips to true or a fatal error occurs
    pub async fn run<E: GameEnvironment>(
        &mut self,
        env: &mut E,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        self.run_ms = unix_ms();
        let outcome = self.drive(env, &cancel).await;
        if let Err(e) = &outcome {
            error!("Run aborted: {}", e);
        }
        self.shutdown(env).await;
        outcome.map(|_| self.summary())
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            episodes_completed: self.episodes_completed,
            total_steps: self.total_steps,
            final_epsilon: self.policy.epsilon(),
            persistence_failures: self.persistence_failures,
        }
    }

    async fn drive<E: GameEnvironment>(
        &mut self,
        env: &mut E,
        cancel: &watch::Receiver<bool>,
    ) -> Result<()> {
        self.begin_episode(env).await?;

        loop {
            if *cancel.borrow() {
                info!("Cancellation requested, stopping after step boundary");
                return Ok(());
            }

            match self.step(env).await? {
                StepOutcome::Continue => {}
                outcome => {
                    self.end_episode(outcome);
                    self.begin_episode(env).await?;
                }
            }
        }
    }

    /// IDLE/TERMINATED → RUNNING
    async fn begin_episode<E: GameEnvironment>(&mut self, env: &mut E) -> Result<()> {
        if !env.reset().await? {
            return Err(AgentError::Environment("reset rejected".to_string()));
        }

        self.episode += 1;
        self.episode_steps = 0;
        self.consecutive_errors = 0;
        self.context = None;

        let path = StepLog::path_in(&self.config.log_dir, self.run_ms, self.episode);
        self.log = match StepLog::create(path) {
            Ok(log) => Some(log),
            Err(e) => {
                error!("Step log unavailable for episode {}: {}", self.episode, e);
                self.persistence_failures += 1;
                None
            }
        };

        self.state = ControllerState::Running;
        info!(
            "Episode {} started (epsilon {:.4})",
            self.episode,
            self.policy.epsilon()
        );
        Ok(())
    }

    async fn step<E: GameEnvironment>(&mut self, env: &mut E) -> Result<StepOutcome> {
        let obs = env.get_state().await?;
        if obs.is_error() {
            self.note_error("get_state", &obs)?;
            return Ok(StepOutcome::Continue);
        }

        let state = encode(&obs);
        let action = self.policy.choose_action(&state);
        self.context = Some(TransitionContext { state, action });

        let button = Button::from(action);
        let next = env.step(button).await?;
        if next.is_error() {
            // A button was pressed: the step cost and ε decay still apply
            self.shaper.charge_step_cost();
            self.policy.decay_epsilon();
            self.note_error("step", &next)?;
            return Ok(StepOutcome::Continue);
        }
        self.consecutive_errors = 0;

        let next_state = encode(&next);
        let reward = self.shaper.on_step(&next);
        if let Some(ctx) = self.context {
            self.policy.learn(&ctx.state, ctx.action, reward, &next_state);
        }
        self.policy.decay_epsilon();

        self.episode_steps += 1;
        self.total_steps += 1;
        debug!(
            "Step {}: {} -> ({}, {}) bank {} map {}, reward {:.2}",
            self.episode_steps, button, next.x, next.y, next.map_bank, next.map_num, reward
        );

        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.record(button, &next, reward) {
                error!("Failed to write step log row: {}", e);
                self.persistence_failures += 1;
            }
        }

        if next.done {
            return Ok(StepOutcome::Done);
        }
        match self.config.max_steps_per_episode {
            Some(max) if self.episode_steps >= max => Ok(StepOutcome::Truncated),
            _ => Ok(StepOutcome::Continue),
        }
    }

    fn note_error(&mut self, call: &str, obs: &Observation) -> Result<()> {
        self.consecutive_errors += 1;
        warn!(
            "{} returned an error observation ({:?}), retrying [{} in a row]",
            call, obs.fault, self.consecutive_errors
        );

        let limit = self.config.max_consecutive_errors;
        if limit > 0 && self.consecutive_errors >= limit {
            return Err(AgentError::Environment(format!(
                "{} consecutive error observations",
                self.consecutive_errors
            )));
        }
        Ok(())
    }

    /// RUNNING → TERMINATED: summarize, persist, reset shaping
    fn end_episode(&mut self, outcome: StepOutcome) {
        self.state = ControllerState::Terminated;
        self.episodes_completed += 1;

        let reason = if outcome == StepOutcome::Truncated {
            "truncated"
        } else {
            "done"
        };
        info!(
            "Episode {} {}: {} steps, reward {:.2}, {} tiles, {} goals, epsilon {:.4}",
            self.episode,
            reason,
            self.episode_steps,
            self.shaper.reward(),
            self.shaper.tiles_visited(),
            self.shaper.goals_reached().len(),
            self.policy.epsilon()
        );

        self.close_log();
        self.persist_table();
        self.export_snapshot();
        self.shaper.reset();
        self.context = None;
    }

    fn close_log(&mut self) {
        if let Some(log) = self.log.take() {
            if let Err(e) = log.finish() {
                error!("Failed to close step log: {}", e);
                self.persistence_failures += 1;
            }
        }
    }

    fn persist_table(&mut self) {
        if let Err(e) = self.policy.value_table().save(&self.config.table_path) {
            error!("Failed to save value table, progress is NOT persisted: {}", e);
            self.persistence_failures += 1;
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.config.snapshot_dir.join(format!(
            "value_table_{}_{:05}.csv",
            self.run_ms, self.episode
        ))
    }

    fn export_snapshot(&mut self) {
        let path = self.snapshot_path();
        if let Err(e) = self.policy.value_table().export_tabular(&path) {
            error!("Failed to export value table snapshot: {}", e);
            self.persistence_failures += 1;
        }
    }

    /// Orderly shutdown: persist, close the log, disconnect
    async fn shutdown<E: GameEnvironment>(&mut self, env: &mut E) {
        info!("Shutting down controller");
        self.close_log();
        self.persist_table();
        env.disconnect().await;
        self.context = None;
        self.state = ControllerState::Idle;
    }
}
