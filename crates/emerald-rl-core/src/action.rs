//! Button vocabulary, policy actions, and facing directions

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A button accepted by the emulator's `STEP:<BUTTON>` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
    L,
    R,
}

impl Button {
    /// Full wire vocabulary
    pub const ALL: [Button; 10] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
        Button::L,
        Button::R,
    ];

    /// Wire name of the button
    pub fn name(self) -> &'static str {
        match self {
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::A => "A",
            Button::B => "B",
            Button::Start => "START",
            Button::Select => "SELECT",
            Button::L => "L",
            Button::R => "R",
        }
    }

    /// Look up a button by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Button> {
        let name = name.trim();
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        Button::from_name(s).ok_or_else(|| AgentError::InvalidAction(s.to_string()))
    }
}

/// An action the policy may choose
///
/// Ordinals are stable: they index value table rows and they also encode
/// facing directions (see [`crate::state::direction_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
    A = 4,
    B = 5,
}

/// Number of policy actions
pub const ACTION_COUNT: usize = 6;

impl Action {
    /// Policy action space, in ordinal order
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
        Action::A,
        Action::B,
    ];

    /// Ordinal of the action
    pub fn index(self) -> usize {
        self as usize
    }

    /// Action with the given ordinal
    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    /// Name of the action
    pub fn name(self) -> &'static str {
        Button::from(self).name()
    }

    /// Look up an action by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Action> {
        Button::from_name(name).and_then(|b| Action::try_from(b).ok())
    }
}

impl From<Action> for Button {
    fn from(action: Action) -> Self {
        match action {
            Action::Up => Button::Up,
            Action::Down => Button::Down,
            Action::Left => Button::Left,
            Action::Right => Button::Right,
            Action::A => Button::A,
            Action::B => Button::B,
        }
    }
}

impl TryFrom<Button> for Action {
    type Error = AgentError;

    fn try_from(button: Button) -> Result<Self> {
        match button {
            Button::Up => Ok(Action::Up),
            Button::Down => Ok(Action::Down),
            Button::Left => Ok(Action::Left),
            Button::Right => Ok(Action::Right),
            Button::A => Ok(Action::A),
            Button::B => Ok(Action::B),
            other => Err(AgentError::InvalidAction(format!(
                "{} is not a policy action",
                other
            ))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction the player character is facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Wire name of the direction
    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }

    /// Look up a direction by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Direction> {
        let name = name.trim();
        Direction::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_names_case_insensitive() {
        assert_eq!("up".parse::<Button>().unwrap(), Button::Up);
        assert_eq!("Select".parse::<Button>().unwrap(), Button::Select);
        assert!(matches!(
            "JUMP".parse::<Button>(),
            Err(AgentError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_policy_actions_are_a_subset() {
        for action in Action::ALL {
            let button = Button::from(action);
            assert_eq!(Action::try_from(button).unwrap(), action);
        }
        assert!(Action::try_from(Button::Start).is_err());
        assert_eq!(Action::from_name("start"), None);
        assert_eq!(Action::from_name("b"), Some(Action::B));
    }

    #[test]
    fn test_action_ordinals() {
        for (i, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.index(), i);
            assert_eq!(Action::from_index(i), Some(*action));
        }
        assert_eq!(Action::from_index(ACTION_COUNT), None);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Action::Right).unwrap();
        assert_eq!(json, "\"RIGHT\"");
        let dir: Direction = serde_json::from_str("\"LEFT\"").unwrap();
        assert_eq!(dir, Direction::Left);
    }
}
