// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TestRun`, `BotResult`, and the `TestRunCoordinator` (spec §3, §4.3).

mod coordinator;
mod services;

pub use coordinator::TestRunCoordinator;
pub use services::Services;

use crate::route::HarnessSettings;
use crate::task::TaskResult;
use chrono::{DateTime, Local};
use rand::RngExt;
use serde::Serialize;
use std::time::Duration;

/// Generates an 8-character lowercase-alphanumeric id (spec §3: "id
/// (short random string)").
pub(crate) fn random_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..8)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// The lifecycle status of a [`TestRun`] (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    SettingUp,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses are the ones after which `endTime` is set and
    /// no further mutation happens (spec §3 invariants).
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::SettingUp | RunStatus::Running)
    }
}

/// One task's outcome within a [`BotResult`] (spec §3: "list of
/// TaskResult entries").
#[derive(Clone, Debug, Serialize)]
pub struct TaskRecord {
    pub task_name: String,
    pub result: TaskResult,
    pub duration: Duration,
    pub error_message: Option<String>,
}

/// A single bot's outcome within a [`TestRun`] (spec §3).
#[derive(Clone, Debug, Serialize)]
pub struct BotResult {
    pub bot_name: String,
    pub character_name: Option<String>,
    pub character_class: String,
    pub success: bool,
    pub complete: bool,
    pub task_results: Vec<TaskRecord>,
    pub logs: Vec<String>,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
}

impl BotResult {
    pub(crate) fn new(bot_name: String, character_class: String) -> Self {
        Self {
            bot_name,
            character_name: None,
            character_class,
            success: false,
            complete: false,
            task_results: Vec::new(),
            logs: Vec::new(),
            start_time: Local::now(),
            end_time: None,
        }
    }

    pub fn tasks_completed(&self) -> usize {
        self.task_results
            .iter()
            .filter(|t| t.result == TaskResult::Success)
            .count()
    }

    pub fn tasks_failed(&self) -> usize {
        self.task_results
            .iter()
            .filter(|t| t.result == TaskResult::Failed)
            .count()
    }

    pub fn tasks_skipped(&self) -> usize {
        self.task_results
            .iter()
            .filter(|t| t.result == TaskResult::Skipped)
            .count()
    }
}

/// One execution of a harnessed route across N bots (spec §3).
#[derive(Clone, Debug, Serialize)]
pub struct TestRun {
    pub id: String,
    pub route_name: String,
    pub harness: HarnessSettings,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub status: RunStatus,
    pub bots: Vec<BotResult>,
    pub error_message: Option<String>,
}

impl TestRun {
    pub(crate) fn new(route_name: String, harness: HarnessSettings) -> Self {
        Self {
            id: random_id(),
            route_name,
            harness,
            start_time: Local::now(),
            end_time: None,
            status: RunStatus::Pending,
            bots: Vec::new(),
            error_message: None,
        }
    }

    pub fn bots_completed(&self) -> usize {
        self.bots.iter().filter(|b| b.complete).count()
    }

    pub fn bots_passed(&self) -> usize {
        self.bots.iter().filter(|b| b.complete && b.success).count()
    }

    pub fn bots_failed(&self) -> usize {
        self.bots
            .iter()
            .filter(|b| b.complete && !b.success)
            .count()
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        if status.is_terminal() {
            self.end_time = Some(Local::now());
        }
        self.status = status;
    }
}
