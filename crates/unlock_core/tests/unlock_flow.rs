use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use shared::{
    domain::{InputEvent, StageId},
    error::{GateError, GateErrorKind, GateNotice},
    protocol::{GateSignal, GateSnapshot},
};
use tokio::sync::broadcast::{self, error::RecvError};
use unlock_core::{config::SECRET_SEQUENCE, Gate, GateConfig, GateDeps, GateHandle};

fn spawn_gate(clicks: u32, seconds: u32) -> GateHandle {
    let config = GateConfig {
        challenge_clicks: clicks..=clicks,
        challenge_seconds: seconds..=seconds,
        ..GateConfig::default()
    };
    Gate::spawn(
        config,
        GateDeps::in_memory().with_rng(ChaCha8Rng::seed_from_u64(42)),
    )
    .expect("spawn gate")
}

async fn wait_for_stage(handle: &GateHandle, stage: StageId) -> GateSnapshot {
    let mut snapshots = handle.watch();
    let snapshot = snapshots
        .wait_for(|snapshot| snapshot.stage == stage)
        .await
        .expect("gate running")
        .clone();
    snapshot
}

async fn next_notice(signals: &mut broadcast::Receiver<GateSignal>) -> GateNotice {
    loop {
        match signals.recv().await {
            Ok(GateSignal::Rejected { notice }) => return notice,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => panic!("gate signals closed"),
        }
    }
}

fn enter_sequence(handle: &GateHandle) {
    for event in SECRET_SEQUENCE {
        handle.press(event).expect("press");
    }
}

#[tokio::test(start_paused = true)]
async fn noise_before_the_sequence_still_matches() {
    let handle = spawn_gate(6, 10);
    for event in [InputEvent::A, InputEvent::Other, InputEvent::Up] {
        handle.press(event).expect("press");
    }
    enter_sequence(&handle);

    let snapshot = wait_for_stage(&handle, StageId::Challenge).await;
    assert_eq!(snapshot.required, 6);
}

#[tokio::test(start_paused = true)]
async fn enough_actions_in_time_reach_the_passphrase() {
    let handle = spawn_gate(6, 10);
    enter_sequence(&handle);
    wait_for_stage(&handle, StageId::Challenge).await;

    for _ in 0..6 {
        handle.record_action().expect("action");
    }

    let snapshot = wait_for_stage(&handle, StageId::Passphrase).await;
    assert_eq!(snapshot.attempts_remaining, 3);
}

#[tokio::test(start_paused = true)]
async fn too_few_actions_fall_back_to_the_sequence() {
    let handle = spawn_gate(8, 5);
    let mut signals = handle.subscribe();
    enter_sequence(&handle);
    wait_for_stage(&handle, StageId::Challenge).await;

    for _ in 0..3 {
        handle.record_action().expect("action");
    }

    let notice = next_notice(&mut signals).await;
    assert_eq!(
        notice,
        GateError::ChallengeTimeout {
            elapsed: 3,
            required: 8
        }
        .into()
    );
    wait_for_stage(&handle, StageId::AwaitingSequence).await;

    // A fresh sequence starts a new run.
    enter_sequence(&handle);
    let snapshot = wait_for_stage(&handle, StageId::Challenge).await;
    assert_eq!(snapshot.elapsed, 0);
}

#[tokio::test(start_paused = true)]
async fn lockout_then_recovery_then_unlock() {
    let handle = spawn_gate(1, 5);
    let mut signals = handle.subscribe();
    enter_sequence(&handle);
    wait_for_stage(&handle, StageId::Challenge).await;
    handle.record_action().expect("action");
    wait_for_stage(&handle, StageId::Passphrase).await;

    for expected in [
        GateErrorKind::VerificationMismatch,
        GateErrorKind::VerificationMismatch,
        GateErrorKind::Lockout,
    ] {
        handle.submit("wrong").expect("submit");
        assert_eq!(next_notice(&mut signals).await.kind, expected);
    }

    handle.submit("moon").expect("submit during lockout");
    let refused = next_notice(&mut signals).await;
    assert_eq!(refused.kind, GateErrorKind::Lockout);
    assert_eq!(handle.snapshot().attempts_remaining, 3);
    assert_eq!(handle.snapshot().stage, StageId::Passphrase);

    tokio::time::sleep(Duration::from_secs(31)).await;

    handle.submit("wrong").expect("submit after lockout");
    let mismatch = next_notice(&mut signals).await;
    assert_eq!(
        mismatch,
        GateError::VerificationMismatch {
            attempts_remaining: 2
        }
        .into()
    );

    handle.submit("moon ").expect("submit");
    let snapshot = wait_for_stage(&handle, StageId::Unlocked).await;
    assert_eq!(snapshot.attempts_remaining, 3);
}

#[tokio::test(start_paused = true)]
async fn reset_from_unlocked_returns_to_the_start() {
    let handle = spawn_gate(1, 5);
    enter_sequence(&handle);
    wait_for_stage(&handle, StageId::Challenge).await;
    handle.record_action().expect("action");
    wait_for_stage(&handle, StageId::Passphrase).await;
    handle.submit("Moon").expect("submit");
    wait_for_stage(&handle, StageId::Unlocked).await;

    handle.reset().expect("reset");
    let snapshot = wait_for_stage(&handle, StageId::AwaitingSequence).await;
    assert_eq!(snapshot.required, 0);

    // Stage 2 is unreachable again without the sequence.
    handle.record_action().expect("action");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.snapshot().stage, StageId::AwaitingSequence);
}
