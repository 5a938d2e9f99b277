//! Timed challenge: record a drawn number of actions inside a drawn window.

use std::ops::RangeInclusive;

use rand::Rng;
use shared::error::RejectionReason;

/// Uniform draw from a closed range. An inverted range collapses to its start.
pub fn draw_in_range<R: Rng + ?Sized>(range: &RangeInclusive<u32>, rng: &mut R) -> u32 {
    if range.is_empty() {
        return *range.start();
    }
    rng.gen_range(range.clone())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Success,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStep {
    Progress {
        elapsed: u32,
        required: u32,
        remaining_seconds: u32,
    },
    Finished(ChallengeOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRun {
    pub required_count: u32,
    pub elapsed_count: u32,
    pub window_seconds: u32,
    pub remaining_seconds: u32,
    pub outcome: Option<ChallengeOutcome>,
}

impl ChallengeRun {
    fn new(required_count: u32, window_seconds: u32) -> Self {
        Self {
            required_count,
            elapsed_count: 0,
            window_seconds,
            remaining_seconds: window_seconds,
            outcome: None,
        }
    }

    // Success wins over a timeout reached in the same step.
    fn evaluate(&mut self) -> ChallengeStep {
        if self.elapsed_count >= self.required_count {
            self.outcome = Some(ChallengeOutcome::Success);
            return ChallengeStep::Finished(ChallengeOutcome::Success);
        }
        if self.remaining_seconds == 0 {
            self.outcome = Some(ChallengeOutcome::Timeout);
            return ChallengeStep::Finished(ChallengeOutcome::Timeout);
        }
        ChallengeStep::Progress {
            elapsed: self.elapsed_count,
            required: self.required_count,
            remaining_seconds: self.remaining_seconds,
        }
    }
}

pub struct ChallengeController {
    clicks: RangeInclusive<u32>,
    seconds: RangeInclusive<u32>,
    run: Option<ChallengeRun>,
}

impl ChallengeController {
    pub fn new(clicks: RangeInclusive<u32>, seconds: RangeInclusive<u32>) -> Self {
        Self {
            clicks,
            seconds,
            run: None,
        }
    }

    /// Starts a fresh run, replacing any previous one.
    pub fn activate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &ChallengeRun {
        let required = draw_in_range(&self.clicks, rng);
        let window = draw_in_range(&self.seconds, rng);
        self.run.insert(ChallengeRun::new(required, window))
    }

    pub fn record_action(&mut self) -> Result<ChallengeStep, RejectionReason> {
        let run = self.run.as_mut().ok_or(RejectionReason::WrongStage)?;
        match run.outcome {
            Some(ChallengeOutcome::Timeout) => Err(RejectionReason::Expired),
            Some(ChallengeOutcome::Success) => Err(RejectionReason::Completed),
            None => {
                run.elapsed_count += 1;
                Ok(run.evaluate())
            }
        }
    }

    /// Advances the countdown by one second. `None` when no run is live.
    pub fn tick(&mut self) -> Option<ChallengeStep> {
        let run = self.run.as_mut()?;
        if run.outcome.is_some() {
            return None;
        }
        run.remaining_seconds = run.remaining_seconds.saturating_sub(1);
        Some(run.evaluate())
    }

    pub fn discard(&mut self) {
        self.run = None;
    }

    pub fn run(&self) -> Option<&ChallengeRun> {
        self.run.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.outcome.is_none())
    }
}

#[cfg(test)]
#[path = "tests/challenge_tests.rs"]
mod tests;
