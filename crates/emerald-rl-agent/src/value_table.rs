//! Tabular Q-value store
//!
//! Maps [`PolicyState`] to one [`ActionValues`] row. Reading an unseen state
//! through [`ValueTable::row`] (and therefore [`ValueTable::get`],
//! [`ValueTable::max_value`] and [`ValueTable::update`]) materializes an
//! all-zero row, so every read path sees the same lazily-created default.
//! [`ValueTable::peek`] inspects without materializing.

use emerald_rl_core::{ACTION_COUNT, Action, AgentError, PolicyState, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Expected returns for every policy action at one state, in ordinal order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionValues([f64; ACTION_COUNT]);

impl ActionValues {
    /// Row materialized for an unseen state
    pub fn default_row() -> Self {
        Self([0.0; ACTION_COUNT])
    }

    pub fn get(&self, action: Action) -> f64 {
        self.0[action.index()]
    }

    pub fn set(&mut self, action: Action, value: f64) {
        self.0[action.index()] = value;
    }

    /// Highest value in the row
    pub fn max(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Action with the highest value
    ///
    /// Ties go to the first action in ordinal order. This falls out of the
    /// row layout rather than being a deliberate preference.
    pub fn best_action(&self) -> Action {
        let mut best = Action::ALL[0];
        let mut best_value = self.get(best);
        for action in Action::ALL.into_iter().skip(1) {
            let value = self.get(action);
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        best
    }

    /// `(action, value)` pairs in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        Action::ALL.into_iter().map(|a| (a, self.get(a)))
    }
}

impl Default for ActionValues {
    fn default() -> Self {
        Self::default_row()
    }
}

/// Q-value table
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    rows: BTreeMap<PolicyState, ActionValues>,
}

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct SavedValueTable {
    version: u32,
    fingerprint: String,
    rows: Vec<SavedRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedRow {
    state: PolicyState,
    values: [f64; ACTION_COUNT],
}

/// One line of the tabular export
#[derive(Debug, Serialize)]
struct ExportRow {
    pos_x: i32,
    pos_y: i32,
    map_bank: i32,
    map_num: i32,
    in_battle: i32,
    direction: i32,
    action: &'static str,
    value: f64,
}

/// Columns after the flattened state
const EXPORT_VALUE_COLUMNS: [&str; 2] = ["action", "value"];

impl ValueTable {
    /// Saved table format version
    pub const VERSION: u32 = 1;

    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-insert the row for `state`
    pub fn row(&mut self, state: &PolicyState) -> &ActionValues {
        self.row_mut(state)
    }

    fn row_mut(&mut self, state: &PolicyState) -> &mut ActionValues {
        self.rows
            .entry(*state)
            .or_insert_with(ActionValues::default_row)
    }

    /// Row for `state` without materializing it
    pub fn peek(&self, state: &PolicyState) -> Option<&ActionValues> {
        self.rows.get(state)
    }

    /// Q(state, action); 0.0 for an unseen state
    pub fn get(&mut self, state: &PolicyState, action: Action) -> f64 {
        self.row(state).get(action)
    }

    /// Overwrite Q(state, action)
    pub fn set(&mut self, state: &PolicyState, action: Action, value: f64) {
        self.row_mut(state).set(action, value);
    }

    /// max over actions of Q(state, ·)
    pub fn max_value(&mut self, state: &PolicyState) -> f64 {
        self.row(state).max()
    }

    /// Q-learning update
    ///
    /// Q(s,a) ← Q(s,a) + α[r + γ max_a' Q(s',a') - Q(s,a)]
    pub fn update(
        &mut self,
        state: &PolicyState,
        action: Action,
        reward: f64,
        next_state: &PolicyState,
        alpha: f64,
        gamma: f64,
    ) {
        let current_q = self.get(state, action);
        let max_next_q = self.max_value(next_state);
        let td_target = reward + gamma * max_next_q;
        let new_q = current_q + alpha * (td_target - current_q);
        self.set(state, action, new_q);
    }

    /// Number of materialized states
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in key order
    pub fn iter(&self) -> impl Iterator<Item = (&PolicyState, &ActionValues)> {
        self.rows.iter()
    }

    /// Hex SHA-256 over every row, in key order
    pub fn fingerprint(&self) -> String {
        fingerprint_rows(self.rows.iter().map(|(s, v)| (s, &v.0)))
    }

    /// Write the whole table to `path`
    ///
    /// Writes `<path>.tmp` first and renames it over `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = tmp_path(path);

        let saved = SavedValueTable {
            version: Self::VERSION,
            fingerprint: self.fingerprint(),
            rows: self
                .rows
                .iter()
                .map(|(state, values)| SavedRow {
                    state: *state,
                    values: values.0,
                })
                .collect(),
        };

        let file = File::create(&tmp).map_err(|e| AgentError::persistence(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        rmp_serde::encode::write(&mut writer, &saved)
            .map_err(|e| AgentError::persistence(&tmp, format!("encode failed: {}", e)))?;
        writer.flush().map_err(|e| AgentError::persistence(&tmp, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| AgentError::persistence(&tmp, e.error()))?;
        file.sync_all().map_err(|e| AgentError::persistence(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, path).map_err(|e| AgentError::persistence(path, e))?;

        info!(
            "Saved value table: {} states to {} ({})",
            self.len(),
            path.display(),
            &saved.fingerprint[..12]
        );
        Ok(())
    }

    /// Replace the contents of the table with the rows saved at `path`
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AgentError::persistence(path, e))?;
        let reader = BufReader::new(file);

        let saved: SavedValueTable = rmp_serde::decode::from_read(reader)
            .map_err(|e| AgentError::persistence(path, format!("decode failed: {}", e)))?;

        if saved.version != Self::VERSION {
            return Err(AgentError::persistence(
                path,
                format!(
                    "unsupported table version {} (expected {})",
                    saved.version,
                    Self::VERSION
                ),
            ));
        }

        let fingerprint = fingerprint_rows(saved.rows.iter().map(|r| (&r.state, &r.values)));
        if fingerprint != saved.fingerprint {
            return Err(AgentError::persistence(
                path,
                format!(
                    "fingerprint mismatch (stored {}, computed {})",
                    saved.fingerprint, fingerprint
                ),
            ));
        }

        self.rows = saved
            .rows
            .into_iter()
            .map(|r| (r.state, ActionValues(r.values)))
            .collect();

        info!(
            "Loaded value table: {} states from {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Load `path` if it exists, otherwise start empty
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut table = Self::new();
        if path.exists() {
            table.load(path)?;
        } else {
            info!("No value table at {}, starting fresh", path.display());
        }
        Ok(table)
    }

    /// Flatten every (state, action) pair into CSV for external analysis
    pub fn export_tabular(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| AgentError::persistence(path, e))?;

        writer
            .write_record(PolicyState::FIELD_NAMES.iter().chain(&EXPORT_VALUE_COLUMNS))
            .map_err(|e| AgentError::persistence(path, e))?;

        for (state, values) in &self.rows {
            let [pos_x, pos_y, map_bank, map_num, in_battle, direction] = state.fields();
            for (action, value) in values.iter() {
                writer
                    .serialize(ExportRow {
                        pos_x,
                        pos_y,
                        map_bank,
                        map_num,
                        in_battle,
                        direction,
                        action: action.name(),
                        value,
                    })
                    .map_err(|e| AgentError::persistence(path, e))?;
            }
        }

        writer.flush().map_err(|e| AgentError::persistence(path, e))?;
        debug!(
            "Exported {} rows to {}",
            self.len() * ACTION_COUNT,
            path.display()
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn fingerprint_rows<'a>(
    rows: impl Iterator<Item = (&'a PolicyState, &'a [f64; ACTION_COUNT])>,
) -> String {
    let mut hasher = Sha256::new();
    for (state, values) in rows {
        hasher.update(state.x.to_le_bytes());
        hasher.update(state.y.to_le_bytes());
        hasher.update(state.map_bank.to_le_bytes());
        hasher.update(state.map_num.to_le_bytes());
        hasher.update([state.in_battle]);
        hasher.update(state.facing.to_le_bytes());
        for value in values {
            hasher.update(value.to_bits().to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}
