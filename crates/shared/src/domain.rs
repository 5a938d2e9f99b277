use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Other,
}

impl InputEvent {
    /// Maps a key name as reported by a front-end to an event. Unknown keys
    /// become [`InputEvent::Other`] so they still break a partial sequence.
    pub fn from_key_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "up" | "arrowup" => Self::Up,
            "down" | "arrowdown" => Self::Down,
            "left" | "arrowleft" => Self::Left,
            "right" | "arrowright" => Self::Right,
            "a" | "keya" => Self::A,
            "b" | "keyb" => Self::B,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    #[default]
    AwaitingSequence,
    Challenge,
    Passphrase,
    Unlocked,
}

impl StageId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingSequence => "awaiting_sequence",
            Self::Challenge => "challenge",
            Self::Passphrase => "passphrase",
            Self::Unlocked => "unlocked",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a passphrase guess reached the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputOrigin {
    #[default]
    Typed,
    Pasted,
    Dropped,
}
