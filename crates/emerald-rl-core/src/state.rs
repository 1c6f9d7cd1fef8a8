//! Canonical policy-state encoding
//!
//! Two observations with the same position, map, battle flag and facing
//! must encode to identical [`PolicyState`] values, otherwise the value
//! table never converges.

use serde::{Deserialize, Serialize};

use crate::action::{Action, Direction};
use crate::observation::Observation;

/// Key into the value table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyState {
    pub x: i32,
    pub y: i32,
    pub map_bank: i32,
    pub map_num: i32,
    /// 0 or 1
    pub in_battle: u8,
    /// See [`direction_code`]
    pub facing: i32,
}

impl PolicyState {
    /// Column names matching [`PolicyState::fields`]
    pub const FIELD_NAMES: [&'static str; 6] =
        ["pos_x", "pos_y", "map_bank", "map_num", "in_battle", "direction"];

    /// Flat form, in [`PolicyState::FIELD_NAMES`] order
    pub fn fields(&self) -> [i32; 6] {
        [
            self.x,
            self.y,
            self.map_bank,
            self.map_num,
            i32::from(self.in_battle),
            self.facing,
        ]
    }

    /// Inverse of [`PolicyState::fields`]; `None` unless `in_battle` is 0 or 1
    pub fn from_fields(fields: [i32; 6]) -> Option<Self> {
        let [x, y, map_bank, map_num, in_battle, facing] = fields;
        let in_battle = match in_battle {
            0 => 0,
            1 => 1,
            _ => return None,
        };
        Some(Self {
            x,
            y,
            map_bank,
            map_num,
            in_battle,
            facing,
        })
    }

    pub fn position(&self) -> PositionKey {
        PositionKey {
            x: self.x,
            y: self.y,
            map_bank: self.map_bank,
            map_num: self.map_num,
        }
    }

    /// Facing direction, if the code is one [`Direction::code`] produces
    pub fn direction(&self) -> Option<Direction> {
        FACING_CODES
            .iter()
            .find(|(_, a)| a.index() as i32 == self.facing)
            .map(|(d, _)| *d)
    }
}

/// Tile identity used by the novelty bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub x: i32,
    pub y: i32,
    pub map_bank: i32,
    pub map_num: i32,
}

/// Facing directions share the ordinals of the matching movement actions.
///
/// Facing is not an action, but persisted tables were built with these
/// codes. Changing `Action` ordinals silently re-keys every stored state;
/// `test_direction_codes_track_action_ordinals` guards it.
const FACING_CODES: [(Direction, Action); 4] = [
    (Direction::Up, Action::Up),
    (Direction::Down, Action::Down),
    (Direction::Left, Action::Left),
    (Direction::Right, Action::Right),
];

impl Direction {
    /// Numeric code used in [`PolicyState::facing`]
    pub fn code(self) -> i32 {
        FACING_CODES
            .iter()
            .find(|(d, _)| *d == self)
            .map(|(_, a)| a.index() as i32)
            .unwrap_or(-1)
    }
}

/// Map a facing-direction name to its code
pub fn direction_code(name: &str) -> Option<i32> {
    Direction::from_name(name).map(Direction::code)
}

/// Encode an observation into its policy state
pub fn encode(obs: &Observation) -> PolicyState {
    PolicyState {
        x: obs.x,
        y: obs.y,
        map_bank: obs.map_bank,
        map_num: obs.map_num,
        in_battle: u8::from(obs.in_battle),
        facing: obs.facing.code(),
    }
}

/// Tile the observation is standing on
pub fn position_key(obs: &Observation) -> PositionKey {
    PositionKey {
        x: obs.x,
        y: obs.y,
        map_bank: obs.map_bank,
        map_num: obs.map_num,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Button;

    fn obs_at(x: i32, y: i32, facing: Direction) -> Observation {
        Observation {
            x,
            y,
            map_bank: 0,
            map_num: 9,
            in_battle: false,
            facing,
            last_action: None,
            step_count: 0,
            done: false,
            fault: None,
        }
    }

    #[test]
    fn test_direction_codes_track_action_ordinals() {
        assert_eq!(direction_code("UP"), Some(Action::Up.index() as i32));
        assert_eq!(direction_code("down"), Some(Action::Down.index() as i32));
        assert_eq!(direction_code("LEFT"), Some(Action::Left.index() as i32));
        assert_eq!(direction_code("Right"), Some(Action::Right.index() as i32));
        assert_eq!(direction_code("NORTH"), None);
    }

    #[test]
    fn test_encode_ignores_non_state_fields() {
        let a = obs_at(5, 7, Direction::Left);
        let mut b = a.clone();
        b.step_count = 900;
        b.last_action = Some(Button::Start);
        b.done = true;

        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn test_encode_distinguishes_facing_and_battle() {
        let a = obs_at(5, 7, Direction::Left);
        let b = obs_at(5, 7, Direction::Right);
        assert_ne!(encode(&a), encode(&b));

        let mut c = a.clone();
        c.in_battle = true;
        let s = encode(&c);
        assert_eq!(s.in_battle, 1);
        assert_ne!(s, encode(&a));
    }

    #[test]
    fn test_decode_recovers_encoded_parts() {
        let mut o = obs_at(5, 7, Direction::Right);
        o.in_battle = true;
        let s = encode(&o);

        assert_eq!(s.fields(), [5, 7, 0, 9, 1, Action::Right.index() as i32]);
        assert_eq!(PolicyState::from_fields(s.fields()), Some(s));
        assert_eq!(s.direction(), Some(Direction::Right));
        assert_eq!(s.position(), position_key(&o));

        assert_eq!(PolicyState::from_fields([5, 7, 0, 9, 2, 0]), None);
        let unknown = PolicyState { facing: 42, ..s };
        assert_eq!(unknown.direction(), None);
    }

    #[test]
    fn test_position_key_ignores_facing() {
        let a = obs_at(3, 4, Direction::Up);
        let b = obs_at(3, 4, Direction::Down);
        assert_eq!(position_key(&a), position_key(&b));
    }
}
