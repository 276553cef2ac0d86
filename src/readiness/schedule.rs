//! Phased poll schedule.

use crate::{Error, ErrorContext, Result};
use std::time::Duration;

/// One polling phase. `duration: None` means the phase runs until the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPhase {
    pub interval: Duration,
    pub duration: Option<Duration>,
}

impl PollPhase {
    pub fn bounded(interval: Duration, duration: Duration) -> Self {
        Self {
            interval,
            duration: Some(duration),
        }
    }

    pub fn open(interval: Duration) -> Self {
        Self {
            interval,
            duration: None,
        }
    }
}

/// Where a tick falls in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSlot {
    pub index: usize,
    pub interval: Duration,
}

/// Ordered polling phases bounded by a total timeout.
///
/// Phases run back to back from the start of the attempt. Intervals never
/// decrease from one phase to the next, and no tick is ever scheduled past the
/// timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    phases: Vec<PollPhase>,
    timeout: Duration,
}

fn schedule_error(msg: &str, details: String) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path("schedule.phases")
            .with_details(details)
            .with_source("poll_schedule"),
    )
}

impl PollSchedule {
    pub fn new(phases: Vec<PollPhase>, timeout: Duration) -> Result<Self> {
        if phases.is_empty() {
            return Err(schedule_error("schedule needs at least one phase", String::new()));
        }
        if timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "timeout must be positive",
                ErrorContext::new()
                    .with_field_path("schedule.timeout")
                    .with_source("poll_schedule"),
            ));
        }
        let mut previous = Duration::ZERO;
        for (i, phase) in phases.iter().enumerate() {
            if phase.interval.is_zero() {
                return Err(schedule_error(
                    "poll interval must be positive",
                    format!("phase {}", i),
                ));
            }
            if phase.interval < previous {
                return Err(schedule_error(
                    "poll intervals must be non-decreasing",
                    format!(
                        "phase {} interval {:?} < previous {:?}",
                        i, phase.interval, previous
                    ),
                ));
            }
            previous = phase.interval;
        }
        Ok(Self { phases, timeout })
    }

    /// Fast phase for `fast_for`, then `slow` until `timeout`.
    pub fn phased(
        fast: Duration,
        fast_for: Duration,
        slow: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            vec![PollPhase::bounded(fast, fast_for), PollPhase::open(slow)],
            timeout,
        )
    }

    pub fn phases(&self) -> &[PollPhase] {
        &self.phases
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Phase active at `elapsed` time into the attempt.
    pub fn phase_at(&self, elapsed: Duration) -> PhaseSlot {
        let mut phase_end = Duration::ZERO;
        for (index, phase) in self.phases.iter().enumerate() {
            match phase.duration {
                Some(d) => {
                    phase_end = phase_end.saturating_add(d);
                    if elapsed < phase_end {
                        return PhaseSlot {
                            index,
                            interval: phase.interval,
                        };
                    }
                }
                None => {
                    return PhaseSlot {
                        index,
                        interval: phase.interval,
                    }
                }
            }
        }
        // every phase was bounded and all are over: keep the last interval
        let index = self.phases.len() - 1;
        PhaseSlot {
            index,
            interval: self.phases[index].interval,
        }
    }

    /// Offset of the tick after one at `elapsed`, capped at the timeout.
    /// `None` once the timeout has been reached.
    pub fn next_tick(&self, elapsed: Duration) -> Option<Duration> {
        if elapsed >= self.timeout {
            return None;
        }
        let slot = self.phase_at(elapsed);
        Some(elapsed.saturating_add(slot.interval).min(self.timeout))
    }

    /// All tick offsets from the start of an attempt up to and including the timeout.
    pub fn ticks(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut at = Some(Duration::ZERO);
        std::iter::from_fn(move || {
            let next = self.next_tick(at?)?;
            at = Some(next);
            Some(next)
        })
    }
}
