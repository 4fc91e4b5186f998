// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TaskExecutor`: the single-bot state machine that drives a
//! [`TaskRoute`] (spec §4.2).

use crate::client::BotClient;
use crate::errors::RouteLoadError;
use crate::route::TaskRoute;
use crate::task::{Task, TaskResult};
use crate::time::{StopwatchStart, stopwatch};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// The cadence at which a bot's tick loop drives its executor (spec §5:
/// "~10 Hz").
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Emitted when one task in the route reaches a terminal result.
#[derive(Clone, Debug)]
pub struct TaskCompleted {
    pub task_name: String,
    pub result: TaskResult,
    pub duration: Duration,
    pub error_message: Option<String>,
}

/// Emitted exactly once, as the last event of an activation, when the
/// executor stops driving the route (success, failure, or
/// cancellation never emits this — see [`ExecutorEvent`] docs).
#[derive(Clone, Debug)]
pub struct RouteCompleted {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Events the executor broadcasts (spec §9 redesign-flags: an explicit
/// bounded bus owned by the unit of work, not an abstract pub-sub
/// edge, so a slow coordinator listener cannot lose events).
#[derive(Clone, Debug)]
pub enum ExecutorEvent {
    TaskCompleted(TaskCompleted),
    RouteCompleted(RouteCompleted),
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives one bot through a [`TaskRoute`]. Owns no knowledge of
/// routes-within-runs or coordinators (spec §4.1, last line).
pub struct TaskExecutor {
    route_name: String,
    loop_route: bool,
    tasks: Vec<Box<dyn Task>>,
    /// `None` when idle (never activated, or deactivated/completed).
    index: Option<usize>,
    /// Whether `tasks[index]`'s `start` has already been called.
    current_started: bool,
    paused: bool,
    task_clock: Option<StopwatchStart>,
    events_tx: broadcast::Sender<ExecutorEvent>,
}

impl TaskExecutor {
    pub fn new(route: &TaskRoute) -> Result<Self, RouteLoadError> {
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            route_name: route.name.clone(),
            loop_route: route.loop_route,
            tasks: route.build_tasks()?,
            index: None,
            current_started: false,
            paused: false,
            task_clock: None,
            events_tx,
        })
    }

    /// Subscribes to this executor's events. Must be called before
    /// [`TaskExecutor::activate`] to avoid missing early events (spec
    /// §4.3 step 10).
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Activates the route: sets the cursor to the first task. Refuses
    /// to activate an empty route (spec §4.2).
    pub fn activate(&mut self) -> bool {
        if self.tasks.is_empty() {
            tracing::warn!(route = %self.route_name, "refusing to activate a route with no tasks");
            return false;
        }
        self.index = Some(0);
        self.current_started = false;
        self.task_clock = Some(stopwatch());
        self.paused = false;
        true
    }

    /// Freezes the state machine. The current task's delay gates stop
    /// counting; `Cleanup` is deferred until `resume` or `deactivate`
    /// (spec §4.2).
    pub fn pause(&mut self) {
        if self.paused || self.index.is_none() {
            return;
        }
        self.paused = true;
        if let Some(i) = self.index {
            self.tasks[i].pause();
        }
        if let Some(clock) = &mut self.task_clock {
            clock.pause();
        }
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if let Some(i) = self.index {
            self.tasks[i].resume();
        }
        if let Some(clock) = &mut self.task_clock {
            clock.resume();
        }
    }

    /// Cancels the executor: calls `Cleanup` on the current task
    /// without emitting `RouteCompleted` (spec §4.2, §5).
    pub async fn deactivate(&mut self, client: &dyn BotClient) {
        if let Some(i) = self.index.take() {
            if self.current_started {
                self.tasks[i].cleanup(client).await;
            }
        }
        self.current_started = false;
        self.paused = false;
    }

    /// One executor tick: advances the state machine by at most one
    /// transition. Called by the bot's tick loop at a fixed cadence
    /// (spec §5, ~10 Hz); must be cheap and non-blocking per tick.
    pub async fn tick(&mut self, client: &dyn BotClient) {
        if self.paused {
            return;
        }
        let Some(index) = self.index else {
            return;
        };

        if !self.current_started {
            let started = self.tasks[index].start(client).await;
            self.current_started = true;
            if !started {
                // Fail-immediate: recorded as Failed without an Update cycle.
                self.settle(index, TaskResult::Failed, client, None).await;
                return;
            }
        }

        let mut panic_override = None;
        let result = match AssertUnwindSafe(self.tasks[index].update(client))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(task = %self.tasks[index].name(), "task update panicked: {message}");
                panic_override = Some(message);
                TaskResult::Failed
            }
        };

        if result.is_terminal() {
            self.settle(index, result, client, panic_override).await;
        }
    }

    /// `panic_override` carries the exception text when `result` came
    /// from a caught panic rather than the task's own terminal state,
    /// since the panicking body never had a chance to set its own
    /// `error_message()` (spec §4.2: exceptions are "Failed with the
    /// exception message as ErrorMessage").
    async fn settle(
        &mut self,
        index: usize,
        result: TaskResult,
        client: &dyn BotClient,
        panic_override: Option<String>,
    ) {
        let duration = self
            .task_clock
            .as_ref()
            .map(|c| c.snapshot().active)
            .unwrap_or(Duration::ZERO);
        let error_message = if result == TaskResult::Failed {
            Some(panic_override.unwrap_or_else(|| {
                self.tasks[index]
                    .error_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| "task failed".to_string())
            }))
        } else {
            None
        };

        self.tasks[index].cleanup(client).await;

        let _ = self.events_tx.send(ExecutorEvent::TaskCompleted(TaskCompleted {
            task_name: self.tasks[index].name().to_string(),
            result,
            duration,
            error_message: error_message.clone(),
        }));

        match result {
            TaskResult::Failed => {
                if self.loop_route {
                    self.advance_to(0);
                } else {
                    self.finish(false, error_message);
                }
            }
            TaskResult::Success | TaskResult::Skipped => {
                let next = index + 1;
                if next < self.tasks.len() {
                    self.advance_to(next);
                } else if self.loop_route {
                    self.advance_to(0);
                } else {
                    self.finish(true, None);
                }
            }
            TaskResult::Running => unreachable!("settle is only called with terminal results"),
        }
    }

    /// Activates this executor and drives it to completion on a fixed
    /// tick cadence, consuming both `self` and a client handle so it
    /// can run as a detached task (spec §5: the executor is "owned by
    /// one thread-of-execution"). `cancel` deactivates the executor
    /// without emitting `RouteCompleted`, matching coordinator-driven
    /// cancellation (spec §5).
    pub async fn run_to_completion(mut self, client: Arc<dyn BotClient>, cancel: CancellationToken) {
        if !self.activate() {
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.deactivate(&*client).await;
                    return;
                }
                _ = tokio::time::sleep(DEFAULT_TICK_INTERVAL) => {
                    self.tick(&*client).await;
                    if !self.is_active() {
                        return;
                    }
                }
            }
        }
    }

    fn advance_to(&mut self, index: usize) {
        self.index = Some(index);
        self.current_started = false;
        self.task_clock = Some(stopwatch());
    }

    fn finish(&mut self, success: bool, error_message: Option<String>) {
        self.index = None;
        self.current_started = false;
        let _ = self
            .events_tx
            .send(ExecutorEvent::RouteCompleted(RouteCompleted {
                success,
                error_message,
            }));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{HarnessSetup, Position, TaskAction, TaskActionProgress};
    use crate::route::parse_route;
    use async_trait::async_trait;
    use camino::Utf8Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub(crate) struct FakeClient {
        pub(crate) level: AtomicU32,
        pub(crate) quests: Mutex<Vec<u32>>,
        pub(crate) items: Mutex<Vec<(u32, u32)>>,
        pub(crate) action_result: Mutex<TaskActionProgress>,
    }

    impl FakeClient {
        pub(crate) fn new() -> Self {
            Self {
                level: AtomicU32::new(1),
                quests: Mutex::new(Vec::new()),
                items: Mutex::new(Vec::new()),
                action_result: Mutex::new(TaskActionProgress::Success),
            }
        }
    }

    #[async_trait]
    impl BotClient for FakeClient {
        async fn start(&self) {}
        async fn exit(&self) {}
        fn connected(&self) -> bool {
            true
        }
        fn logged_in(&self) -> bool {
            true
        }
        fn character_name(&self) -> Option<String> {
            Some("Testchar".to_string())
        }
        async fn apply_harness_setup(&self, _setup: &HarnessSetup) -> Result<(), String> {
            Ok(())
        }
        async fn load_route(&self, _path: &Utf8Path) -> Result<TaskExecutor, RouteLoadError> {
            unimplemented!("not exercised in these tests")
        }
        fn load_parsed_route(&self, route: TaskRoute) -> TaskExecutor {
            TaskExecutor::new(&route).expect("route builds")
        }
        async fn log_out(&self) {}
        async fn log_in(&self) {}
        async fn dispose(&self) {}
        async fn drive_task_action(&self, _action: &TaskAction) -> TaskActionProgress {
            self.action_result.lock().unwrap().clone()
        }
        fn level(&self) -> u32 {
            self.level.load(Ordering::SeqCst)
        }
        fn has_quest_in_log(&self, quest_id: u32) -> bool {
            self.quests.lock().unwrap().contains(&quest_id)
        }
        fn has_item(&self, entry: u32, count: u32) -> bool {
            self.items
                .lock()
                .unwrap()
                .iter()
                .any(|(e, c)| *e == entry && *c >= count)
        }
    }

    fn route_json(body: &str) -> TaskRoute {
        parse_route(Utf8Path::new("<test>"), body.as_bytes()).expect("route parses")
    }

    #[tokio::test]
    async fn single_passing_task_completes_route() {
        let route = route_json(
            r#"{"name":"t1","tasks":[{"type":"LogMessage","message":"hi"}]}"#,
        );
        let mut exec = TaskExecutor::new(&route).unwrap();
        let mut events = exec.subscribe();
        let client = FakeClient::new();
        assert!(exec.activate());

        let mut task_results = Vec::new();
        let mut route_completed = None;
        for _ in 0..20 {
            exec.tick(&client).await;
            while let Ok(event) = events.try_recv() {
                match event {
                    ExecutorEvent::TaskCompleted(t) => task_results.push(t),
                    ExecutorEvent::RouteCompleted(r) => route_completed = Some(r),
                }
            }
            if route_completed.is_some() {
                break;
            }
        }

        assert_eq!(task_results.len(), 1);
        assert_eq!(task_results[0].result, TaskResult::Success);
        let completed = route_completed.expect("route should have completed");
        assert!(completed.success);
        assert!(!exec.is_active());
    }

    #[tokio::test]
    async fn failing_assert_emits_failure_with_observed_value() {
        let route = route_json(
            r#"{"name":"t3","tasks":[{"type":"AssertLevel","minLevel":10}]}"#,
        );
        let mut exec = TaskExecutor::new(&route).unwrap();
        let mut events = exec.subscribe();
        let client = FakeClient::new();
        assert!(exec.activate());

        let mut route_completed = None;
        let mut error_message = None;
        for _ in 0..20 {
            exec.tick(&client).await;
            while let Ok(event) = events.try_recv() {
                match event {
                    ExecutorEvent::TaskCompleted(t) => error_message = t.error_message,
                    ExecutorEvent::RouteCompleted(r) => route_completed = Some(r),
                }
            }
            if route_completed.is_some() {
                break;
            }
        }

        let completed = route_completed.unwrap();
        assert!(!completed.success);
        assert!(error_message.unwrap().contains("observed level 1"));
    }

    #[tokio::test]
    async fn empty_route_refuses_to_activate() {
        let route = route_json(r#"{"name":"empty","tasks":[]}"#);
        let mut exec = TaskExecutor::new(&route).unwrap();
        assert!(!exec.activate());
        assert!(!exec.is_active());
    }

    #[tokio::test]
    async fn looped_route_repeats_after_success() {
        let route = route_json(
            r#"{"name":"loopy","loop":true,"tasks":[{"type":"LogMessage","message":"hi"}]}"#,
        );
        let mut exec = TaskExecutor::new(&route).unwrap();
        let mut events = exec.subscribe();
        let client = FakeClient::new();
        assert!(exec.activate());

        let mut completions = 0;
        for _ in 0..60 {
            exec.tick(&client).await;
            while let Ok(event) = events.try_recv() {
                if let ExecutorEvent::TaskCompleted(_) = event {
                    completions += 1;
                }
            }
            if completions >= 3 {
                break;
            }
        }
        assert!(completions >= 3, "expected the looped task to repeat");
        assert!(exec.is_active(), "a looped route never emits RouteCompleted on its own");
    }

    #[tokio::test]
    async fn pause_freezes_wait_task_elapsed_time() {
        let route = route_json(r#"{"name":"w","tasks":[{"type":"Wait","seconds":1}]}"#);
        let mut exec = TaskExecutor::new(&route).unwrap();
        let client = FakeClient::new();
        assert!(exec.activate());

        exec.tick(&client).await;
        exec.pause();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exec.tick(&client).await;
        assert!(exec.is_active(), "paused executor should not advance");
        exec.resume();
    }

    struct PanickingTask;

    #[async_trait]
    impl Task for PanickingTask {
        fn name(&self) -> &str {
            "panics"
        }
        fn error_message(&self) -> Option<&str> {
            None
        }
        async fn start(&mut self, _client: &dyn BotClient) -> bool {
            true
        }
        async fn update(&mut self, _client: &dyn BotClient) -> TaskResult {
            panic!("kaboom");
        }
        async fn cleanup(&mut self, _client: &dyn BotClient) {}
        fn pause(&mut self) {}
        fn resume(&mut self) {}
    }

    #[tokio::test]
    async fn panicking_task_reports_the_panic_message() {
        let mut exec = TaskExecutor {
            route_name: "panics".to_string(),
            loop_route: false,
            tasks: vec![Box::new(PanickingTask)],
            index: None,
            current_started: false,
            paused: false,
            task_clock: None,
            events_tx: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        };
        let mut events = exec.subscribe();
        let client = FakeClient::new();
        assert!(exec.activate());

        let mut error_message = None;
        for _ in 0..5 {
            exec.tick(&client).await;
            while let Ok(event) = events.try_recv() {
                if let ExecutorEvent::TaskCompleted(t) = event {
                    error_message = t.error_message;
                }
            }
            if error_message.is_some() {
                break;
            }
        }

        assert_eq!(error_message.as_deref(), Some("kaboom"));
    }

    #[tokio::test]
    async fn deactivate_runs_cleanup_without_route_completed() {
        let route = route_json(r#"{"name":"c","tasks":[{"type":"Wait","seconds":10}]}"#);
        let mut exec = TaskExecutor::new(&route).unwrap();
        let mut events = exec.subscribe();
        let client = FakeClient::new();
        assert!(exec.activate());
        exec.tick(&client).await;
        exec.deactivate(&client).await;
        assert!(!exec.is_active());
        assert!(events.try_recv().is_err(), "no events should have fired");
    }
}
