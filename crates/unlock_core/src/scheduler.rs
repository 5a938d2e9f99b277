//! Timer tasks owned by the gate. Every task lives in a [`ScheduledTask`],
//! which aborts it on drop, so dropping the handle is the one teardown path.

use std::time::Duration;

use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::debug;

pub struct ScheduledTask {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn from_handle(label: &'static str, handle: JoinHandle<()>) -> Self {
        Self { label, handle }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!(task = self.label, "cancelling scheduled task");
        }
        self.handle.abort();
    }
}

/// Sends `message` once after `delay`.
pub fn spawn_once<M: Send + 'static>(
    label: &'static str,
    delay: Duration,
    tx: UnboundedSender<M>,
    message: M,
) -> ScheduledTask {
    let handle = tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(message);
    });
    ScheduledTask::from_handle(label, handle)
}

/// Sends `make(beat)` every `period`, first after one full period. Stops on
/// its own once the receiver is gone.
pub fn spawn_periodic<M, F>(
    label: &'static str,
    period: Duration,
    tx: UnboundedSender<M>,
    make: F,
) -> ScheduledTask
where
    M: Send + 'static,
    F: Fn(u64) -> M + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut beat = 0_u64;
        loop {
            interval.tick().await;
            beat += 1;
            if tx.send(make(beat)).is_err() {
                break;
            }
        }
    });
    ScheduledTask::from_handle(label, handle)
}
