// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer events broadcast by the coordinators (spec §6, §9).
//!
//! "In the design this is an abstract publish-subscribe edge; a
//! systems implementation should prefer a channel or bounded message
//! bus owned by the TestRun so events cannot be lost if the
//! coordinator's listener is briefly slow" (spec §9 redesign flags).
//! Each `TestRun`/`TestSuiteRun` owns a `tokio::sync::broadcast`
//! channel; handlers that fall behind see `Lagged` and simply miss the
//! oldest buffered events rather than blocking the coordinator.

use crate::run::RunStatus;
use crate::suite::SuiteRunStatus;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) fn new_channel<T: Clone>() -> (
    tokio::sync::broadcast::Sender<T>,
    tokio::sync::broadcast::Receiver<T>,
) {
    tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Events fired by a [`crate::run::TestRunCoordinator`].
#[derive(Clone, Debug)]
pub enum RunEvent {
    Started {
        run_id: String,
    },
    StatusChanged {
        run_id: String,
        status: RunStatus,
    },
    BotCompleted {
        run_id: String,
        bot_name: String,
        success: bool,
    },
    Completed {
        run_id: String,
        status: RunStatus,
    },
}

/// Events fired by a [`crate::suite::TestSuiteCoordinator`].
#[derive(Clone, Debug)]
pub enum SuiteEvent {
    Started { suite_run_id: String },
    Completed { suite_run_id: String, status: SuiteRunStatus },
}
