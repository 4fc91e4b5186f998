// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A jittered, pausable delay used for a task's pre/post delay phases.
//!
//! Spec §4.1: "Delays are randomized by adding 0-50% uniform jitter to
//! configured values" and §4.2: "measured from the transition into the
//! delay phase... and are unaffected by Pause/Resume (paused time
//! accumulates)".

use super::stopwatch::{StopwatchStart, stopwatch};
use rand::RngExt;
use rand::distr::OpenClosed01;
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct DelayGate {
    target: Duration,
    stopwatch: StopwatchStart,
}

impl DelayGate {
    /// Starts a new gate for `base`, applying 0-50% additive jitter.
    pub(crate) fn start(base: Duration) -> Self {
        let jitter: f64 = rand::rng().sample(OpenClosed01);
        let target = base.mul_f64(1.0 + jitter * 0.5);
        Self {
            target,
            stopwatch: stopwatch(),
        }
    }

    pub(crate) fn pause(&mut self) {
        self.stopwatch.pause();
    }

    pub(crate) fn resume(&mut self) {
        self.stopwatch.resume();
    }

    pub(crate) fn is_elapsed(&self) -> bool {
        self.stopwatch.snapshot().active >= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_never_shrinks_the_base() {
        for _ in 0..50 {
            let gate = DelayGate::start(Duration::from_millis(100));
            assert!(gate.target >= Duration::from_millis(100));
            assert!(gate.target <= Duration::from_millis(150));
        }
    }

    #[test]
    fn zero_base_elapses_immediately() {
        let gate = DelayGate::start(Duration::ZERO);
        assert!(gate.is_elapsed());
    }
}
