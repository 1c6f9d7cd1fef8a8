//! Observation types

use serde::{Deserialize, Serialize};

use crate::action::{Button, Direction};

/// One observed emulator state, produced once per protocol exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Tile X coordinate
    pub x: i32,
    /// Tile Y coordinate
    pub y: i32,
    /// Map bank (map group)
    pub map_bank: i32,
    /// Map number within the bank
    pub map_num: i32,
    /// Player is in a battle
    pub in_battle: bool,
    /// Direction the player is facing
    pub facing: Direction,
    /// Button the emulator last executed
    pub last_action: Option<Button>,
    /// Emulator-side step counter
    pub step_count: u64,
    /// Goal reached or soft-lock detected
    pub done: bool,
    /// Set when this observation stands in for a failed exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ObservationFault>,
}

/// Why an exchange produced an error observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationFault {
    /// No reply within the read bound; worth retrying
    Timeout,
    /// Reply was short, had an unknown tag, or failed to parse
    Malformed,
    /// Emulator answered `ERROR:<reason>`
    ServerError,
    /// Command rejected before sending
    InvalidAction,
}

impl Observation {
    /// Error observation: all positional fields -1, not in battle, not done
    pub fn error(fault: ObservationFault) -> Self {
        Self {
            x: -1,
            y: -1,
            map_bank: -1,
            map_num: -1,
            in_battle: false,
            facing: Direction::Up,
            last_action: None,
            step_count: 0,
            done: false,
            fault: Some(fault),
        }
    }

    /// Whether this is an error observation
    pub fn is_error(&self) -> bool {
        self.fault.is_some()
    }

    /// Whether the failure was a timeout (as opposed to a bad reply)
    pub fn is_timeout(&self) -> bool {
        self.fault == Some(ObservationFault::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_observation_shape() {
        let obs = Observation::error(ObservationFault::Malformed);
        assert_eq!((obs.x, obs.y, obs.map_bank, obs.map_num), (-1, -1, -1, -1));
        assert!(!obs.in_battle);
        assert!(!obs.done);
        assert!(obs.is_error());
        assert!(!obs.is_timeout());
        assert!(Observation::error(ObservationFault::Timeout).is_timeout());
    }
}
