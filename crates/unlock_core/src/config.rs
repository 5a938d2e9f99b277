//! Fixed gate configuration. A [`GateConfig`] is handed to the gate once at
//! construction and never mutated afterwards.

use std::{ops::RangeInclusive, time::Duration};

use shared::domain::InputEvent;
use thiserror::Error;

pub const SECRET_SEQUENCE: [InputEvent; 10] = [
    InputEvent::Up,
    InputEvent::Up,
    InputEvent::Down,
    InputEvent::Down,
    InputEvent::Left,
    InputEvent::Right,
    InputEvent::Left,
    InputEvent::Right,
    InputEvent::B,
    InputEvent::A,
];

/// SHA-256 of the normalized passphrase `MOON`.
pub const PASSPHRASE_DIGEST: &str =
    "addf9430f1392c9bed3315724ca7157afa8bb3dbb59763cf6082328fe2af05d1";

const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub target_sequence: Vec<InputEvent>,
    pub challenge_clicks: RangeInclusive<u32>,
    pub challenge_seconds: RangeInclusive<u32>,
    pub passphrase_digest: String,
    pub lockout_threshold: u32,
    pub lockout_duration: Duration,
    pub challenge_success_delay: Duration,
    pub challenge_failure_delay: Duration,
    pub unlock_delay: Duration,
    pub ambient_pulse_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            target_sequence: SECRET_SEQUENCE.to_vec(),
            challenge_clicks: 5..=10,
            challenge_seconds: 5..=10,
            passphrase_digest: PASSPHRASE_DIGEST.to_string(),
            lockout_threshold: 3,
            lockout_duration: Duration::from_secs(30),
            challenge_success_delay: Duration::from_millis(750),
            challenge_failure_delay: Duration::from_millis(1500),
            unlock_delay: Duration::from_millis(750),
            ambient_pulse_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("target sequence must not be empty")]
    EmptySequence,
    #[error("{name} range {start}..={end} is empty or starts at zero")]
    InvalidRange {
        name: &'static str,
        start: u32,
        end: u32,
    },
    #[error("passphrase digest must be {DIGEST_HEX_LEN} hex characters")]
    MalformedDigest,
    #[error("lockout threshold must be at least 1")]
    ZeroThreshold,
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_sequence.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        check_range("challenge_clicks", &self.challenge_clicks)?;
        check_range("challenge_seconds", &self.challenge_seconds)?;

        let digest = self.passphrase_digest.as_bytes();
        if digest.len() != DIGEST_HEX_LEN || !digest.iter().all(u8::is_ascii_hexdigit) {
            return Err(ConfigError::MalformedDigest);
        }
        if self.lockout_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }

        for (name, value) in [
            ("lockout_duration", self.lockout_duration),
            ("ambient_pulse_interval", self.ambient_pulse_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { name });
            }
        }
        Ok(())
    }
}

fn check_range(name: &'static str, range: &RangeInclusive<u32>) -> Result<(), ConfigError> {
    if range.is_empty() || *range.start() == 0 {
        return Err(ConfigError::InvalidRange {
            name,
            start: *range.start(),
            end: *range.end(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
