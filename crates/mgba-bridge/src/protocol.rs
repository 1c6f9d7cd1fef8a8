//! Wire protocol for Rust <-> mGBA Lua script communication
//!
//! Requests are newline-terminated ASCII commands. Replies are a single
//! line starting with a tag:
//!
//! | Command          | Reply                        |
//! |------------------|------------------------------|
//! | `PING`           | `PONG`                       |
//! | `RESET`          | `RESET_OK`                   |
//! | `GETSTATE`       | `STATE:<9 comma fields>`     |
//! | `STEP:<BUTTON>`  | `STATE:<9 comma fields>`     |
//! | any failure      | `ERROR:<reason>`             |
//!
//! State fields, in order: `x,y,mapBank,mapNum,inBattle,done,lastAction,stepCount,facing`.

use emerald_rl_core::{AgentError, Button, Direction, Observation, Result};
use std::fmt;

/// Number of comma-separated fields after `STATE:`
pub const STATE_FIELD_COUNT: usize = 9;

/// Commands sent to the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Reset,
    GetState,
    Step(Button),
}

impl Command {
    /// Wire bytes, including the trailing newline
    pub fn encode(&self) -> Vec<u8> {
        format!("{}\n", self).into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => f.write_str("PING"),
            Command::Reset => f.write_str("RESET"),
            Command::GetState => f.write_str("GETSTATE"),
            Command::Step(button) => write!(f, "STEP:{}", button),
        }
    }
}

/// Decoded reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    State(Observation),
    Error(String),
    ResetOk,
    Pong,
}

/// Decode one trimmed reply line
pub fn parse_reply(text: &str) -> Result<Reply> {
    let text = text.trim();

    if let Some(fields) = text.strip_prefix("STATE:") {
        return parse_state(fields).map(Reply::State);
    }
    if let Some(reason) = text.strip_prefix("ERROR:") {
        return Ok(Reply::Error(reason.trim().to_string()));
    }
    match text {
        "RESET_OK" => Ok(Reply::ResetOk),
        "PONG" => Ok(Reply::Pong),
        "" => Err(AgentError::Parse("empty reply".to_string())),
        other => Err(AgentError::Parse(format!("unknown reply: {}", preview(other)))),
    }
}

/// Decode the comma fields of a `STATE:` reply
pub fn parse_state(fields: &str) -> Result<Observation> {
    let data: Vec<&str> = fields.split(',').map(str::trim).collect();
    if data.len() != STATE_FIELD_COUNT {
        return Err(AgentError::Parse(format!(
            "expected {} state fields, got {}",
            STATE_FIELD_COUNT,
            data.len()
        )));
    }

    Ok(Observation {
        x: parse_int(data[0], "x")?,
        y: parse_int(data[1], "y")?,
        map_bank: parse_int(data[2], "mapBank")?,
        map_num: parse_int(data[3], "mapNum")?,
        in_battle: parse_flag(data[4]),
        done: parse_flag(data[5]),
        last_action: parse_last_action(data[6])?,
        step_count: data[7]
            .parse()
            .map_err(|e| AgentError::Parse(format!("stepCount {:?}: {}", data[7], e)))?,
        facing: Direction::from_name(data[8])
            .ok_or_else(|| AgentError::Parse(format!("unknown facing {:?}", data[8])))?,
        fault: None,
    })
}

fn parse_int(field: &str, name: &str) -> Result<i32> {
    field
        .parse()
        .map_err(|e| AgentError::Parse(format!("{} {:?}: {}", name, field, e)))
}

/// Anything other than `true` is false, matching the Lua side
fn parse_flag(field: &str) -> bool {
    field.eq_ignore_ascii_case("true")
}

fn parse_last_action(field: &str) -> Result<Option<Button>> {
    if field.is_empty() || field.eq_ignore_ascii_case("NONE") || field.eq_ignore_ascii_case("NIL")
    {
        return Ok(None);
    }
    Button::from_name(field)
        .map(Some)
        .ok_or_else(|| AgentError::Parse(format!("unknown lastAction {:?}", field)))
}

fn preview(text: &str) -> String {
    text.chars().take(64).collect()
}
