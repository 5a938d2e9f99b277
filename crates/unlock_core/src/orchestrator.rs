//! Stage orchestrator for the unlock gate.
//!
//! ```text
//! ┌──────────────────┐ sequence ┌───────────┐ cleared ┌────────────┐ accepted ┌──────────┐
//! │ AwaitingSequence │─────────>│ Challenge │────────>│ Passphrase │─────────>│ Unlocked │
//! └──────────────────┘          └───────────┘         └────────────┘          └──────────┘
//!          ^                          │ timeout            │ mismatch / lockout
//!          └──────────────────────────┘                    └──> stays in Passphrase
//! ```
//!
//! A [`Gate`] runs as one tokio task and handles inputs strictly one at a
//! time. Timers, cosmetic delays and digest computation report back through an
//! internal channel tagged with the epoch they were started in; anything that
//! arrives after the stage moved on is dropped. Reset leads back to
//! `AwaitingSequence` from any stage.
//!
//! The lockout countdown belongs to the verifier, not the stage. It keeps
//! ticking across transitions until the lockout ends.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use shared::{
    domain::{InputEvent, InputOrigin, StageId},
    error::{GateError, RejectionReason},
    protocol::{GateInput, GateSignal, GateSnapshot},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    challenge::{ChallengeController, ChallengeOutcome, ChallengeStep},
    config::GateConfig,
    passphrase::{digest_hex, LockoutPolicy, PassphraseVerifier, VerifyOutcome},
    scheduler::{spawn_once, spawn_periodic, ScheduledTask},
    sequence::SequenceMatcher,
    Effects, FlagStore, MemoryFlagStore, SilentEffects,
};

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
const LOCKOUT_DISPLAY_PERIOD: Duration = Duration::from_secs(1);
const SIGNAL_CAPACITY: usize = 256;

pub struct GateDeps {
    pub flags: Arc<dyn FlagStore>,
    pub effects: Arc<dyn Effects>,
    pub rng: Box<dyn RngCore + Send>,
}

impl GateDeps {
    pub fn in_memory() -> Self {
        Self {
            flags: Arc::new(MemoryFlagStore::default()),
            effects: Arc::new(SilentEffects),
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    pub fn with_flags(mut self, flags: Arc<dyn FlagStore>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_effects(mut self, effects: Arc<dyn Effects>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    EnterPassphrase,
    RevertToSequence,
    EnterUnlocked,
}

impl Deferred {
    fn expected_stage(self) -> StageId {
        match self {
            Self::EnterPassphrase | Self::RevertToSequence => StageId::Challenge,
            Self::EnterUnlocked => StageId::Passphrase,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::EnterPassphrase => "enter_passphrase",
            Self::RevertToSequence => "revert_to_sequence",
            Self::EnterUnlocked => "enter_unlocked",
        }
    }
}

enum Internal {
    CountdownTick { epoch: u64 },
    LockoutTick { generation: u64 },
    AmbientPulse { epoch: u64, beat: u64 },
    Deferred { epoch: u64, step: Deferred },
    DigestReady { epoch: u64, digest: String },
}

/// Tasks scoped to the current stage. All of them go on every transition.
#[derive(Default)]
struct StageTasks {
    countdown: Option<ScheduledTask>,
    deferred: Option<ScheduledTask>,
    digest: Option<ScheduledTask>,
    ambient: Option<ScheduledTask>,
}

impl StageTasks {
    fn cancel_all(&mut self) {
        *self = Self::default();
    }

    fn active_count(&self) -> usize {
        [
            &self.countdown,
            &self.deferred,
            &self.digest,
            &self.ambient,
        ]
        .into_iter()
        .filter(|task| matches!(task, Some(task) if !task.is_finished()))
        .count()
    }
}

#[derive(Clone)]
pub struct GateHandle {
    inputs: mpsc::UnboundedSender<GateInput>,
    signals: broadcast::Sender<GateSignal>,
    snapshots: watch::Receiver<GateSnapshot>,
}

impl GateHandle {
    pub fn send(&self, input: GateInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| anyhow!("unlock gate is no longer running"))
    }

    pub fn press(&self, event: InputEvent) -> Result<()> {
        self.send(GateInput::Key { event })
    }

    pub fn record_action(&self) -> Result<()> {
        self.send(GateInput::ChallengeAction)
    }

    pub fn submit(&self, guess: impl Into<String>) -> Result<()> {
        self.submit_with_origin(guess, InputOrigin::Typed)
    }

    pub fn submit_with_origin(&self, guess: impl Into<String>, origin: InputOrigin) -> Result<()> {
        self.send(GateInput::SubmitPassphrase {
            guess: guess.into(),
            origin,
        })
    }

    pub fn reset(&self) -> Result<()> {
        self.send(GateInput::Reset)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GateSignal> {
        self.signals.subscribe()
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GateSnapshot> {
        self.snapshots.clone()
    }
}

pub struct Gate {
    config: GateConfig,
    stage: StageId,
    epoch: u64,
    matcher: SequenceMatcher,
    challenge: ChallengeController,
    verifier: PassphraseVerifier,
    verification_pending: bool,
    unlock_pending: bool,
    status: String,
    deps: GateDeps,
    tasks: StageTasks,
    lockout_display: Option<ScheduledTask>,
    lockout_generation: u64,
    internal_tx: mpsc::UnboundedSender<Internal>,
    signals: broadcast::Sender<GateSignal>,
    snapshots: watch::Sender<GateSnapshot>,
}

impl Gate {
    /// Validates `config` and starts the gate on the current tokio runtime.
    /// The gate stops once every [`GateHandle`] is dropped.
    pub fn spawn(config: GateConfig, deps: GateDeps) -> Result<GateHandle> {
        config.validate()?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(GateSnapshot::default());

        let gate = Self {
            matcher: SequenceMatcher::new(config.target_sequence.clone()),
            challenge: ChallengeController::new(
                config.challenge_clicks.clone(),
                config.challenge_seconds.clone(),
            ),
            verifier: PassphraseVerifier::new(
                config.passphrase_digest.clone(),
                LockoutPolicy {
                    threshold: config.lockout_threshold,
                    duration: config.lockout_duration,
                },
            ),
            config,
            stage: StageId::AwaitingSequence,
            epoch: 0,
            verification_pending: false,
            unlock_pending: false,
            status: "Waiting for the secret sequence".to_string(),
            deps,
            tasks: StageTasks::default(),
            lockout_display: None,
            lockout_generation: 0,
            internal_tx,
            signals: signals.clone(),
            snapshots,
        };
        gate.publish_snapshot();
        tokio::spawn(gate.run(input_rx, internal_rx));

        Ok(GateHandle {
            inputs: input_tx,
            signals,
            snapshots: snapshot_rx,
        })
    }

    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<GateInput>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        info!(stage = %self.stage, "unlock gate started");
        loop {
            tokio::select! {
                biased;
                Some(message) = internal.recv() => self.on_internal(message),
                input = inputs.recv() => match input {
                    Some(input) => self.on_input(input),
                    None => break,
                },
            }
            self.publish_snapshot();
        }
        self.tasks.cancel_all();
        self.lockout_display = None;
        info!("unlock gate stopped");
    }

    fn on_input(&mut self, input: GateInput) {
        match input {
            GateInput::Key { event } => self.on_key(event),
            GateInput::ChallengeAction => self.on_challenge_action(),
            GateInput::SubmitPassphrase { guess, origin } => self.on_submit(&guess, origin),
            GateInput::Reset => self.reset(),
        }
    }

    fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::CountdownTick { epoch } => {
                if self.is_stale(epoch, StageId::Challenge, "countdown_tick") {
                    return;
                }
                if let Some(step) = self.challenge.tick() {
                    self.apply_challenge_step(step);
                }
            }
            Internal::LockoutTick { generation } => {
                if generation != self.lockout_generation {
                    debug!(generation, "discarding stale lockout tick");
                    return;
                }
                self.on_lockout_tick();
            }
            Internal::AmbientPulse { epoch, beat } => {
                if self.is_stale(epoch, StageId::Unlocked, "ambient_pulse") {
                    return;
                }
                self.emit(GateSignal::AmbientPulse { beat });
            }
            Internal::Deferred { epoch, step } => {
                if self.is_stale(epoch, step.expected_stage(), step.label()) {
                    return;
                }
                self.tasks.deferred = None;
                self.apply_deferred(step);
            }
            Internal::DigestReady { epoch, digest } => {
                if self.is_stale(epoch, StageId::Passphrase, "passphrase_digest") {
                    return;
                }
                self.tasks.digest = None;
                self.on_digest(&digest);
            }
        }
    }

    fn on_key(&mut self, event: InputEvent) {
        if self.stage != StageId::AwaitingSequence {
            self.reject(RejectionReason::WrongStage);
            return;
        }
        if self.matcher.push(event) {
            info!("secret sequence entered");
            self.start_challenge();
        }
    }

    fn start_challenge(&mut self) {
        self.transition(StageId::Challenge);
        let run = self.challenge.activate(&mut self.deps.rng).clone();

        let epoch = self.epoch;
        self.tasks.countdown = Some(spawn_periodic(
            "challenge_countdown",
            COUNTDOWN_PERIOD,
            self.internal_tx.clone(),
            move |_| Internal::CountdownTick { epoch },
        ));

        info!(
            required = run.required_count,
            window_secs = run.window_seconds,
            "challenge run started"
        );
        self.emit(GateSignal::ChallengeProgress {
            elapsed: run.elapsed_count,
            required: run.required_count,
            remaining_seconds: run.remaining_seconds,
        });
        self.set_status(format!(
            "Stage 2: tap {} times within {} seconds",
            run.required_count, run.window_seconds
        ));
    }

    fn on_challenge_action(&mut self) {
        if self.stage != StageId::Challenge {
            self.reject(RejectionReason::WrongStage);
            return;
        }
        match self.challenge.record_action() {
            Ok(step) => self.apply_challenge_step(step),
            Err(reason) => self.reject(reason),
        }
    }

    fn apply_challenge_step(&mut self, step: ChallengeStep) {
        match step {
            ChallengeStep::Progress {
                elapsed,
                required,
                remaining_seconds,
            } => {
                self.emit(GateSignal::ChallengeProgress {
                    elapsed,
                    required,
                    remaining_seconds,
                });
                self.set_status(format!("{elapsed}/{required} taps, {remaining_seconds}s left"));
            }
            ChallengeStep::Finished(outcome) => {
                self.tasks.countdown = None;
                let (elapsed, required, remaining_seconds) = self
                    .challenge
                    .run()
                    .map(|run| (run.elapsed_count, run.required_count, run.remaining_seconds))
                    .unwrap_or_default();

                match outcome {
                    ChallengeOutcome::Success => {
                        info!(elapsed, required, "challenge cleared");
                        self.emit(GateSignal::ChallengeProgress {
                            elapsed,
                            required,
                            remaining_seconds,
                        });
                        self.set_status("Challenge cleared!");
                        self.defer(
                            Deferred::EnterPassphrase,
                            self.config.challenge_success_delay,
                        );
                    }
                    ChallengeOutcome::Timeout => {
                        info!(elapsed, required, "challenge timed out");
                        self.report(GateError::ChallengeTimeout { elapsed, required });
                        self.defer(
                            Deferred::RevertToSequence,
                            self.config.challenge_failure_delay,
                        );
                    }
                }
            }
        }
    }

    fn on_submit(&mut self, guess: &str, origin: InputOrigin) {
        if self.stage != StageId::Passphrase {
            self.reject(RejectionReason::WrongStage);
            return;
        }
        if self.verification_pending || self.unlock_pending {
            self.reject(RejectionReason::VerificationPending);
            return;
        }

        let candidate = match self.verifier.admit(guess, origin, Instant::now()) {
            Ok(candidate) => candidate,
            Err(error) => {
                self.report(error);
                return;
            }
        };

        self.verification_pending = true;
        let tx = self.internal_tx.clone();
        let epoch = self.epoch;
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let digest = digest_hex(&candidate);
            let _ = tx.send(Internal::DigestReady { epoch, digest });
        });
        self.tasks.digest = Some(ScheduledTask::from_handle("passphrase_digest", handle));
        self.set_status("Checking...");
    }

    fn on_digest(&mut self, digest: &str) {
        self.verification_pending = false;
        let now = Instant::now();
        let outcome = self.verifier.settle(digest, now);

        match outcome {
            VerifyOutcome::Success => {
                info!("passphrase accepted");
                self.lockout_display = None;
                self.unlock_pending = true;
                self.emit(GateSignal::PassphraseAccepted);
                self.set_status("Passphrase accepted");
                self.defer(Deferred::EnterUnlocked, self.config.unlock_delay);
            }
            VerifyOutcome::LockedOut { .. } | VerifyOutcome::Mismatch { .. } => {
                if matches!(outcome, VerifyOutcome::LockedOut { .. }) {
                    self.start_lockout_display();
                }
                if let Some(error) = outcome.into_error(now) {
                    self.report(error);
                }
            }
        }
    }

    fn start_lockout_display(&mut self) {
        self.lockout_generation += 1;
        let generation = self.lockout_generation;
        self.lockout_display = Some(spawn_periodic(
            "lockout_countdown",
            LOCKOUT_DISPLAY_PERIOD,
            self.internal_tx.clone(),
            move |_| Internal::LockoutTick { generation },
        ));
    }

    // Runs in every stage; only the passphrase stage shows it as status.
    fn on_lockout_tick(&mut self) {
        let remaining_seconds = self.verifier.lockout_remaining_seconds(Instant::now());
        self.emit(GateSignal::LockoutTick { remaining_seconds });
        if remaining_seconds == 0 {
            self.lockout_display = None;
        }
        if self.stage != StageId::Passphrase {
            return;
        }
        if remaining_seconds == 0 {
            self.set_status("Lockout over; try the passphrase again");
        } else {
            self.set_status(format!("Locked: try again in {remaining_seconds}s"));
        }
    }

    fn apply_deferred(&mut self, step: Deferred) {
        match step {
            Deferred::EnterPassphrase => {
                self.challenge.discard();
                self.transition(StageId::Passphrase);
                let remaining_seconds = self.verifier.lockout_remaining_seconds(Instant::now());
                if remaining_seconds > 0 {
                    self.set_status(format!("Locked: try again in {remaining_seconds}s"));
                } else {
                    self.set_status(format!(
                        "Stage 3: enter the passphrase ({} attempts left)",
                        self.verifier.attempts_remaining()
                    ));
                }
            }
            Deferred::RevertToSequence => {
                self.challenge.discard();
                self.matcher.reset();
                self.transition(StageId::AwaitingSequence);
                self.set_status("Too slow. Back to the start.");
            }
            Deferred::EnterUnlocked => {
                self.unlock_pending = false;
                self.transition(StageId::Unlocked);
                self.on_unlocked();
            }
        }
    }

    fn on_unlocked(&mut self) {
        info!("control panel unlocked");
        self.emit(GateSignal::Unlocked);
        self.set_status("Unlocked! Control panel revealed.");

        let epoch = self.epoch;
        self.tasks.ambient = Some(spawn_periodic(
            "ambient_pulse",
            self.config.ambient_pulse_interval,
            self.internal_tx.clone(),
            move |beat| Internal::AmbientPulse { epoch, beat },
        ));
        self.spawn_flourish();
    }

    // Detached: the flourish must never hold up or undo the unlock.
    fn spawn_flourish(&self) {
        let flags = Arc::clone(&self.deps.flags);
        let effects = Arc::clone(&self.deps.effects);
        let signals = self.signals.clone();
        tokio::spawn(async move {
            match flags.flourish_shown().await {
                Ok(true) => {
                    debug!("first-unlock flourish already shown");
                    return;
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(%error, "could not read flourish flag; skipping flourish");
                    return;
                }
            }

            if let Err(error) = effects.play_flourish().await {
                warn!(%error, "flourish effect failed");
                return;
            }
            if let Err(error) = flags.mark_flourish_shown().await {
                warn!(%error, "failed to persist flourish flag");
            }
            let _ = signals.send(GateSignal::Flourish);
        });
    }

    fn reset(&mut self) {
        info!(stage = %self.stage, "gate reset requested");
        self.matcher.reset();
        self.challenge.discard();
        self.verification_pending = false;
        self.unlock_pending = false;
        self.transition(StageId::AwaitingSequence);
        self.set_status("Gate reset");
    }

    fn transition(&mut self, to: StageId) {
        let from = self.stage;
        let cancelled = self.tasks.active_count();
        self.tasks.cancel_all();
        self.stage = to;
        self.epoch += 1;
        info!(%from, %to, epoch = self.epoch, cancelled, "stage transition");
        self.emit(GateSignal::StageChanged { from, to });
    }

    fn defer(&mut self, step: Deferred, delay: Duration) {
        self.tasks.deferred = Some(spawn_once(
            step.label(),
            delay,
            self.internal_tx.clone(),
            Internal::Deferred {
                epoch: self.epoch,
                step,
            },
        ));
    }

    fn is_stale(&self, epoch: u64, expected: StageId, what: &'static str) -> bool {
        let stale = epoch != self.epoch || self.stage != expected;
        if stale {
            debug!(
                what,
                epoch,
                current_epoch = self.epoch,
                stage = %self.stage,
                "discarding stale completion"
            );
        }
        stale
    }

    fn reject(&mut self, reason: RejectionReason) {
        self.report(GateError::RejectedInput {
            stage: self.stage,
            reason,
        });
    }

    fn report(&mut self, error: GateError) {
        debug!(kind = ?error.kind(), %error, stage = %self.stage, "gate refused input");
        self.set_status(error.to_string());
        self.emit(GateSignal::Rejected {
            notice: error.into(),
        });
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.emit(GateSignal::Status {
            message: self.status.clone(),
        });
    }

    fn emit(&self, signal: GateSignal) {
        let _ = self.signals.send(signal);
    }

    fn snapshot(&self) -> GateSnapshot {
        let run = self.challenge.run();
        GateSnapshot {
            stage: self.stage,
            elapsed: run.map_or(0, |run| run.elapsed_count),
            required: run.map_or(0, |run| run.required_count),
            remaining_seconds: run.map_or(0, |run| run.remaining_seconds),
            lockout_remaining_seconds: self.verifier.lockout_remaining_seconds(Instant::now()),
            attempts_remaining: self.verifier.attempts_remaining(),
            status: self.status.clone(),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
