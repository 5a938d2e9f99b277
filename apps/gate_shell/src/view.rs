use shared::protocol::{GateSignal, GateSnapshot};

pub const CONTROL_PANEL: &str = "\
+--------------------------------------+
|            CONTROL  PANEL            |
|                                      |
|   [ lights ]  [ sound ]  [ doors ]   |
|                                      |
|   type 'reset' to lock it again      |
+--------------------------------------+";

/// Text to print for a signal. Signals already mirrored in a status line
/// render nothing.
pub fn render_signal(signal: &GateSignal) -> Option<String> {
    match signal {
        GateSignal::StageChanged { from, to } => Some(format!("[{from} -> {to}]")),
        GateSignal::Status { message } => Some(format!("  {message}")),
        GateSignal::Unlocked => Some(CONTROL_PANEL.to_string()),
        GateSignal::Flourish => Some("  * * * first unlock! * * *".to_string()),
        GateSignal::ChallengeProgress { .. }
        | GateSignal::Rejected { .. }
        | GateSignal::LockoutTick { .. }
        | GateSignal::PassphraseAccepted
        | GateSignal::AmbientPulse { .. } => None,
    }
}

pub fn render_status(snapshot: &GateSnapshot) -> String {
    let mut out = format!("stage: {}\nstatus: {}", snapshot.stage, snapshot.status);
    if snapshot.required > 0 {
        out.push_str(&format!(
            "\nchallenge: {}/{} taps, {}s left",
            snapshot.elapsed, snapshot.required, snapshot.remaining_seconds
        ));
    }
    out.push_str(&format!("\nattempts left: {}", snapshot.attempts_remaining));
    if snapshot.lockout_remaining_seconds > 0 {
        out.push_str(&format!(
            "\nlocked for {}s",
            snapshot.lockout_remaining_seconds
        ));
    }
    out
}
