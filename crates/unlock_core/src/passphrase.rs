//! Passphrase verification with attempt lockout.
//!
//! The digest only keeps the plain-text passphrase out of casual view; it is
//! not a secrecy guarantee against anyone who can read the client.

use std::time::Duration;

use sha2::{Digest, Sha256};
use shared::{
    domain::InputOrigin,
    error::{GateError, SubmissionProblem},
};
use tokio::time::Instant;
use tracing::{debug, info};

pub fn normalize_guess(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_uppercase();
    (!normalized.is_empty()).then_some(normalized)
}

pub fn digest_hex(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockoutState {
    pub failure_count: u32,
    pub lockout_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Mismatch { attempts_remaining: u32 },
    LockedOut { until: Instant },
}

impl VerifyOutcome {
    pub fn into_error(self, now: Instant) -> Option<GateError> {
        match self {
            Self::Success => None,
            Self::Mismatch { attempts_remaining } => {
                Some(GateError::VerificationMismatch { attempts_remaining })
            }
            Self::LockedOut { until } => Some(GateError::Lockout {
                remaining_seconds: ceil_seconds(until.saturating_duration_since(now)),
            }),
        }
    }
}

pub struct PassphraseVerifier {
    expected_digest: String,
    policy: LockoutPolicy,
    state: LockoutState,
}

impl PassphraseVerifier {
    pub fn new(expected_digest: impl Into<String>, policy: LockoutPolicy) -> Self {
        Self {
            expected_digest: expected_digest.into(),
            policy,
            state: LockoutState::default(),
        }
    }

    /// Checks lockout and input before any hashing. Returns the normalized
    /// candidate to digest. Refusals never touch the failure counter.
    pub fn admit(
        &mut self,
        raw: &str,
        origin: InputOrigin,
        now: Instant,
    ) -> Result<String, GateError> {
        if let Some(remaining) = self.lockout_remaining(now) {
            debug!(remaining_ms = remaining.as_millis() as u64, "refused guess during lockout");
            return Err(GateError::Lockout {
                remaining_seconds: ceil_seconds(remaining),
            });
        }
        if self.state.lockout_until.take().is_some() {
            debug!("lockout expired");
        }

        if let Some(problem) = SubmissionProblem::for_origin(origin) {
            return Err(GateError::InvalidSubmission { problem });
        }
        normalize_guess(raw).ok_or(GateError::InvalidSubmission {
            problem: SubmissionProblem::Empty,
        })
    }

    /// Applies the comparison result for a digest produced from an admitted
    /// candidate.
    pub fn settle(&mut self, digest: &str, now: Instant) -> VerifyOutcome {
        if digest.eq_ignore_ascii_case(&self.expected_digest) {
            self.state = LockoutState::default();
            return VerifyOutcome::Success;
        }

        self.state.failure_count += 1;
        if self.state.failure_count >= self.policy.threshold {
            let until = now + self.policy.duration;
            self.state = LockoutState {
                failure_count: 0,
                lockout_until: Some(until),
            };
            info!(
                lockout_secs = self.policy.duration.as_secs(),
                "passphrase attempts exhausted; locking"
            );
            return VerifyOutcome::LockedOut { until };
        }

        VerifyOutcome::Mismatch {
            attempts_remaining: self.policy.threshold - self.state.failure_count,
        }
    }

    pub fn verify(
        &mut self,
        raw: &str,
        origin: InputOrigin,
        now: Instant,
    ) -> Result<VerifyOutcome, GateError> {
        let candidate = self.admit(raw, origin, now)?;
        Ok(self.settle(&digest_hex(&candidate), now))
    }

    pub fn lockout_remaining(&self, now: Instant) -> Option<Duration> {
        self.state
            .lockout_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn lockout_remaining_seconds(&self, now: Instant) -> u64 {
        self.lockout_remaining(now).map_or(0, ceil_seconds)
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.policy.threshold.saturating_sub(self.state.failure_count)
    }

    pub fn state(&self) -> &LockoutState {
        &self.state
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
#[path = "tests/passphrase_tests.rs"]
mod tests;
