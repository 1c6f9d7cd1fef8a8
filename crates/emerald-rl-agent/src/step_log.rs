//! Per-episode CSV step log

use emerald_rl_core::{AgentError, Button, Observation, Result};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One logged step
#[derive(Debug, Serialize)]
struct StepRecord<'a> {
    inputted_action: &'a str,
    x: i32,
    y: i32,
    map_bank: i32,
    map_num: i32,
    is_in_battle: bool,
    is_done: bool,
    executed_step: &'a str,
    current_steps: u64,
    facing_direction: &'a str,
    reward: f64,
}

const STEP_LOG_HEADER: [&str; 11] = [
    "inputtedAction",
    "x",
    "y",
    "mapBank",
    "mapNum",
    "isInBattle",
    "isDone",
    "executedStep",
    "currentSteps",
    "facingDirection",
    "reward",
];

/// Open CSV sink for one episode; flushed after every row
pub struct StepLog {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl StepLog {
    /// Create the file and write the header row
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| AgentError::persistence(&path, e))?;
        writer
            .write_record(STEP_LOG_HEADER)
            .and_then(|_| writer.flush().map_err(csv::Error::from))
            .map_err(|e| AgentError::persistence(&path, e))?;
        info!("Step log: {}", path.display());
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    /// `<dir>/step_log_<run_ms>_<episode>.csv`
    pub fn path_in(dir: &Path, run_ms: u128, episode: u64) -> PathBuf {
        dir.join(format!("step_log_{}_{:05}.csv", run_ms, episode))
    }

    /// Append one step; error observations are skipped
    pub fn record(&mut self, pressed: Button, obs: &Observation, reward: f64) -> Result<()> {
        if obs.is_error() {
            return Ok(());
        }

        let record = StepRecord {
            inputted_action: pressed.name(),
            x: obs.x,
            y: obs.y,
            map_bank: obs.map_bank,
            map_num: obs.map_num,
            is_in_battle: obs.in_battle,
            is_done: obs.done,
            executed_step: obs.last_action.map(Button::name).unwrap_or("NONE"),
            current_steps: obs.step_count,
            facing_direction: obs.facing.name(),
            reward,
        };

        self.writer
            .serialize(record)
            .and_then(|_| self.writer.flush().map_err(csv::Error::from))
            .map_err(|e| AgentError::persistence(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| AgentError::persistence(&self.path, e))?;
        info!(
            "Closed step log {} ({} rows)",
            self.path.display(),
            self.rows
        );
        Ok(())
    }
}

impl Drop for StepLog {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush step log {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emerald_rl_core::{Direction, ObservationFault};

    fn obs() -> Observation {
        Observation {
            x: 7,
            y: 3,
            map_bank: 0,
            map_num: 16,
            in_battle: false,
            facing: Direction::Left,
            last_action: Some(Button::Left),
            step_count: 42,
            done: true,
            fault: None,
        }
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = StepLog::path_in(dir.path(), 1_700_000_000_000, 3);
        assert!(path.ends_with("step_log_1700000000000_00003.csv"));

        let mut log = StepLog::create(&path).unwrap();
        log.record(Button::Left, &obs(), 50.9).unwrap();
        log.record(Button::A, &Observation::error(ObservationFault::Timeout), 50.8)
            .unwrap();
        assert_eq!(log.rows(), 1);
        log.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "inputtedAction,x,y,mapBank,mapNum,isInBattle,isDone,executedStep,currentSteps,facingDirection,reward"
        );
        assert_eq!(lines[1], "LEFT,7,3,0,16,false,true,LEFT,42,LEFT,50.9");
        assert_eq!(lines.len(), 2);
    }
}
