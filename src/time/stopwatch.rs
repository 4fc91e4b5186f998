// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long a bot or a test run has been active.
//!
//! We use a combination of a `SystemTime`-backed wall clock (via
//! `chrono::Local`) and a monotonic `Instant` so that elapsed-time
//! reporting survives clock adjustments during a long-running suite.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// A running stopwatch that can be paused and resumed.
///
/// Paused time does not count towards the elapsed duration. This backs
/// the executor's pre/post delay gates (§4.1/§4.2: "paused time
/// accumulates") as well as per-bot and per-run wall-clock durations.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
    paused_time: Duration,
    pause_state: PauseState,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
            paused_time: Duration::ZERO,
            pause_state: PauseState::Running,
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        matches!(self.pause_state, PauseState::Paused { .. })
    }

    pub(crate) fn pause(&mut self) {
        match &self.pause_state {
            PauseState::Running => {
                self.pause_state = PauseState::Paused {
                    paused_at: Instant::now(),
                };
            }
            PauseState::Paused { .. } => {
                // Idempotent: pausing an already-paused stopwatch is a no-op,
                // since TaskExecutor::pause can be called while Idle too.
            }
        }
    }

    pub(crate) fn resume(&mut self) {
        match &self.pause_state {
            PauseState::Paused { paused_at } => {
                self.paused_time += paused_at.elapsed();
                self.pause_state = PauseState::Running;
            }
            PauseState::Running => {}
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        let paused_time = match &self.pause_state {
            PauseState::Paused { paused_at } => self.paused_time + paused_at.elapsed(),
            PauseState::Running => self.paused_time,
        };
        StopwatchSnapshot {
            start_time: self.start_time,
            active: self.instant.elapsed().saturating_sub(paused_time),
        }
    }
}

/// A point-in-time read of a [`StopwatchStart`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) active: Duration,
}

#[derive(Clone, Debug)]
enum PauseState {
    Running,
    Paused { paused_at: Instant },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_excludes_elapsed_time() {
        let mut start = stopwatch();
        let unpaused = start.clone();

        start.pause();
        std::thread::sleep(Duration::from_millis(200));
        start.resume();

        let paused_snapshot = start.snapshot();
        let unpaused_snapshot = unpaused.snapshot();

        let difference = unpaused_snapshot.active - paused_snapshot.active;
        assert!(
            difference > Duration::from_millis(150),
            "expected roughly 200ms excluded, got {difference:?}"
        );
    }

    #[test]
    fn double_pause_is_idempotent() {
        let mut start = stopwatch();
        start.pause();
        start.pause();
        start.resume();
        assert!(!start.is_paused());
    }
}
