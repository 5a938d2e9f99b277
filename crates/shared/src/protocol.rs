use serde::{Deserialize, Serialize};

use crate::{
    domain::{InputEvent, InputOrigin, StageId},
    error::GateNotice,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GateInput {
    Key {
        event: InputEvent,
    },
    ChallengeAction,
    SubmitPassphrase {
        guess: String,
        #[serde(default)]
        origin: InputOrigin,
    },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum GateSignal {
    StageChanged {
        from: StageId,
        to: StageId,
    },
    Status {
        message: String,
    },
    ChallengeProgress {
        elapsed: u32,
        required: u32,
        remaining_seconds: u32,
    },
    Rejected {
        notice: GateNotice,
    },
    LockoutTick {
        remaining_seconds: u64,
    },
    PassphraseAccepted,
    /// Consumed by the shell to reveal the control panel overlay.
    Unlocked,
    Flourish,
    AmbientPulse {
        beat: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub stage: StageId,
    pub elapsed: u32,
    pub required: u32,
    pub remaining_seconds: u32,
    pub lockout_remaining_seconds: u64,
    pub attempts_remaining: u32,
    pub status: String,
}
