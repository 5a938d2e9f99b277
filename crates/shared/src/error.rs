use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{InputOrigin, StageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateErrorKind {
    RejectedInput,
    InvalidSubmission,
    VerificationMismatch,
    Lockout,
    ChallengeTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    WrongStage,
    Expired,
    Completed,
    VerificationPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionProblem {
    Empty,
    Pasted,
    Dropped,
}

impl SubmissionProblem {
    pub fn for_origin(origin: InputOrigin) -> Option<Self> {
        match origin {
            InputOrigin::Typed => None,
            InputOrigin::Pasted => Some(Self::Pasted),
            InputOrigin::Dropped => Some(Self::Dropped),
        }
    }
}

/// Wire form of a [`GateError`], carried by `GateSignal::Rejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateNotice {
    pub kind: GateErrorKind,
    pub message: String,
}

impl GateNotice {
    pub fn new(kind: GateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("{}", rejected_input_message(*stage, *reason))]
    RejectedInput {
        stage: StageId,
        reason: RejectionReason,
    },
    #[error("{}", submission_message(*problem))]
    InvalidSubmission { problem: SubmissionProblem },
    #[error("incorrect passphrase; {attempts_remaining} attempt(s) remaining")]
    VerificationMismatch { attempts_remaining: u32 },
    #[error("too many attempts; try again in {remaining_seconds}s")]
    Lockout { remaining_seconds: u64 },
    #[error("time is up: {elapsed}/{required} actions recorded")]
    ChallengeTimeout { elapsed: u32, required: u32 },
}

impl GateError {
    pub fn kind(&self) -> GateErrorKind {
        match self {
            Self::RejectedInput { .. } => GateErrorKind::RejectedInput,
            Self::InvalidSubmission { .. } => GateErrorKind::InvalidSubmission,
            Self::VerificationMismatch { .. } => GateErrorKind::VerificationMismatch,
            Self::Lockout { .. } => GateErrorKind::Lockout,
            Self::ChallengeTimeout { .. } => GateErrorKind::ChallengeTimeout,
        }
    }

    /// Whether the error consumed a passphrase attempt.
    pub fn counts_as_attempt(&self) -> bool {
        matches!(self, Self::VerificationMismatch { .. })
    }
}

impl From<GateError> for GateNotice {
    fn from(value: GateError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

fn rejected_input_message(stage: StageId, reason: RejectionReason) -> &'static str {
    match (reason, stage) {
        (RejectionReason::Expired, _) => "this challenge run has expired; wait for the reset",
        (RejectionReason::Completed, _) => "challenge already cleared; hold on",
        (RejectionReason::VerificationPending, _) => "still checking the previous passphrase",
        (RejectionReason::WrongStage, StageId::AwaitingSequence) => {
            "nothing to do here yet; try the secret sequence"
        }
        (RejectionReason::WrongStage, StageId::Challenge) => {
            "keep tapping; the challenge is still running"
        }
        (RejectionReason::WrongStage, StageId::Passphrase) => "type the passphrase to continue",
        (RejectionReason::WrongStage, StageId::Unlocked) => "the control panel is already unlocked",
    }
}

fn submission_message(problem: SubmissionProblem) -> &'static str {
    match problem {
        SubmissionProblem::Empty => "enter a passphrase first",
        SubmissionProblem::Pasted => "pasting is disabled; type the passphrase",
        SubmissionProblem::Dropped => "dropping text is disabled; type the passphrase",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_keeps_kind_and_rendered_message() {
        let notice = GateNotice::from(GateError::VerificationMismatch {
            attempts_remaining: 2,
        });
        assert_eq!(notice.kind, GateErrorKind::VerificationMismatch);
        assert_eq!(notice.message, "incorrect passphrase; 2 attempt(s) remaining");
    }

    #[test]
    fn only_mismatches_count_as_attempts() {
        assert!(GateError::VerificationMismatch {
            attempts_remaining: 1
        }
        .counts_as_attempt());
        assert!(!GateError::Lockout {
            remaining_seconds: 30
        }
        .counts_as_attempt());
        assert!(!GateError::InvalidSubmission {
            problem: SubmissionProblem::Empty
        }
        .counts_as_attempt());
    }

    #[test]
    fn wrong_stage_guidance_depends_on_stage() {
        let early = GateError::RejectedInput {
            stage: StageId::AwaitingSequence,
            reason: RejectionReason::WrongStage,
        };
        let late = GateError::RejectedInput {
            stage: StageId::Unlocked,
            reason: RejectionReason::WrongStage,
        };
        assert_ne!(early.to_string(), late.to_string());
        assert_eq!(early.kind(), GateErrorKind::RejectedInput);
    }

    #[test]
    fn typed_origin_is_not_a_problem() {
        assert_eq!(SubmissionProblem::for_origin(InputOrigin::Typed), None);
        assert_eq!(
            SubmissionProblem::for_origin(InputOrigin::Pasted),
            Some(SubmissionProblem::Pasted)
        );
    }
}
