// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The task contract (spec §4.1) and the delay latch every task shares.

mod kinds;

pub use kinds::{TaskConfig, TaskKind, build_task};

use crate::client::BotClient;
use crate::time::DelayGate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The result of one [`Task::update`] call.
///
/// Terminal results are everything except `Running` (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskResult {
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskResult {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskResult::Running)
    }
}

/// The jittered pre/post delay configuration a task carries (spec §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    #[serde(default)]
    pub pre_delay_seconds: f64,
    #[serde(default)]
    pub post_delay_seconds: f64,
}

impl DelayConfig {
    fn pre_delay(&self) -> Duration {
        Duration::from_secs_f64(self.pre_delay_seconds.max(0.0))
    }

    fn post_delay(&self) -> Duration {
        Duration::from_secs_f64(self.post_delay_seconds.max(0.0))
    }
}

/// The executor-facing contract every task implements (spec §4.1).
///
/// `TaskExecutor` only ever talks to this trait; it has no knowledge of
/// routes, runs, or coordinators.
#[async_trait]
pub trait Task: Send + Sync {
    /// Name used for reporting (`TaskCompleted { task, .. }`).
    fn name(&self) -> &str;

    /// Set once the task has failed; `None` otherwise.
    fn error_message(&self) -> Option<&str>;

    /// One-shot initialization. `false` means fail-immediate: the task
    /// is recorded as `Failed` without any `Update` cycle.
    async fn start(&mut self, client: &dyn BotClient) -> bool;

    /// Called repeatedly on a fixed cadence. Must be non-blocking.
    async fn update(&mut self, client: &dyn BotClient) -> TaskResult;

    /// Invoked exactly once after any terminal `Update` or on
    /// cancellation. Idempotent.
    async fn cleanup(&mut self, client: &dyn BotClient);

    /// Freezes the task's internal delay gates. Cleanup is deferred
    /// until `resume` or deactivation (spec §4.2).
    fn pause(&mut self);

    fn resume(&mut self);
}

/// What a concrete task kind implements: the body between the pre- and
/// post-delay phases. `DelayedTask` wraps this into the full [`Task`]
/// contract so individual task kinds never re-implement delay jitter.
#[async_trait]
pub trait TaskBody: Send + Sync {
    async fn start_body(&mut self, client: &dyn BotClient) -> bool;
    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult;
    async fn cleanup_body(&mut self, client: &dyn BotClient);
    fn error_message(&self) -> Option<&str>;
}

enum Phase {
    PreDelay(DelayGate),
    Body,
    PostDelay(DelayGate, TaskResult),
}

/// The base implementation referenced by spec §4.1: wraps a
/// [`TaskBody`] with a three-phase `preDelay -> body -> postDelay`
/// latch, using jittered, pausable delays.
pub struct DelayedTask<B: TaskBody> {
    name: String,
    body: B,
    delays: DelayConfig,
    phase: Phase,
    paused: bool,
}

impl<B: TaskBody> DelayedTask<B> {
    pub fn new(name: impl Into<String>, body: B, delays: DelayConfig) -> Self {
        Self {
            name: name.into(),
            body,
            phase: Phase::PreDelay(DelayGate::start(delays.pre_delay())),
            delays,
            paused: false,
        }
    }
}

#[async_trait]
impl<B: TaskBody> Task for DelayedTask<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn error_message(&self) -> Option<&str> {
        self.body.error_message()
    }

    async fn start(&mut self, client: &dyn BotClient) -> bool {
        self.body.start_body(client).await
    }

    async fn update(&mut self, client: &dyn BotClient) -> TaskResult {
        if self.paused {
            return TaskResult::Running;
        }
        loop {
            match &mut self.phase {
                Phase::PreDelay(gate) => {
                    if !gate.is_elapsed() {
                        return TaskResult::Running;
                    }
                    self.phase = Phase::Body;
                }
                Phase::Body => {
                    let result = self.body.update_body(client).await;
                    if result.is_terminal() {
                        self.phase =
                            Phase::PostDelay(DelayGate::start(self.delays.post_delay()), result);
                    } else {
                        return TaskResult::Running;
                    }
                }
                Phase::PostDelay(gate, result) => {
                    if !gate.is_elapsed() {
                        return TaskResult::Running;
                    }
                    return *result;
                }
            }
        }
    }

    async fn cleanup(&mut self, client: &dyn BotClient) {
        self.body.cleanup_body(client).await;
    }

    fn pause(&mut self) {
        self.paused = true;
        match &mut self.phase {
            Phase::PreDelay(gate) | Phase::PostDelay(gate, _) => gate.pause(),
            Phase::Body => {}
        }
    }

    fn resume(&mut self) {
        self.paused = false;
        match &mut self.phase {
            Phase::PreDelay(gate) | Phase::PostDelay(gate, _) => gate.resume(),
            Phase::Body => {}
        }
    }
}
