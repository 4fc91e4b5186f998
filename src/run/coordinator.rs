// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TestRunCoordinator` (spec §4.3): orchestrates one multi-bot test
//! run end-to-end.

use super::services::Services;
use super::{BotResult, RunStatus, TaskRecord, TestRun};
use crate::client::HarnessSetup;
use crate::errors::TestRunError;
use crate::events::RunEvent;
use crate::executor::{ExecutorEvent, TaskExecutor};
use crate::route::{self, HarnessSettings, TaskRoute, require_test_harness};
use camino::Utf8Path;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const BOT_START_STAGGER: Duration = Duration::from_millis(500);
const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(250);
const SETUP_SETTLE_GRACE: Duration = Duration::from_millis(500);
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_EMIT_INTERVAL: Duration = Duration::from_secs(2);
const LOGOUT_GRACE: Duration = Duration::from_millis(500);

type RunRegistry = Mutex<HashMap<String, TestRun>>;

/// Orchestrates one multi-bot test run end-to-end (spec §4.3).
///
/// `activeRuns`/`completedRuns` are modeled as a single-owner registry:
/// every mutation goes through `&self` methods on this type, and
/// external readers only ever see cloned snapshots (spec §9 redesign
/// flags: "replace shared-lock collections... with a single-owner
/// registry actor").
pub struct TestRunCoordinator {
    services: Services,
    active: Arc<RunRegistry>,
    completed: Arc<RunRegistry>,
    run_cancel_tokens: Mutex<HashMap<String, CancellationToken>>,
    events_tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl TestRunCoordinator {
    pub fn new(services: Services) -> Self {
        let (events_tx, _rx) = crate::events::new_channel();
        Self {
            services,
            active: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(Mutex::new(HashMap::new())),
            run_cancel_tokens: Mutex::new(HashMap::new()),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.events_tx.subscribe()
    }

    /// Starts and fully drives a test run (spec §4.3 algorithm). Errors
    /// here occur strictly before a `TestRun` is registered (route
    /// load, missing harness); every other failure mode (login
    /// timeout, run timeout, cancellation, collaborator error) is
    /// reflected in the returned `TestRun`'s terminal status instead.
    pub async fn start_run(
        &self,
        route_path: &Utf8Path,
        cancel: CancellationToken,
    ) -> Result<TestRun, TestRunError> {
        let route = route::load_route(route_path, &self.services.routes_dir).await?;
        let harness = require_test_harness(&route)?.clone();

        let mut run = TestRun::new(route.name.clone(), harness.clone());
        run.set_status(RunStatus::SettingUp);
        let run_id = run.id.clone();
        self.active.lock().await.insert(run_id.clone(), run);
        self.run_cancel_tokens
            .lock()
            .await
            .insert(run_id.clone(), cancel.clone());
        let _ = self.events_tx.send(RunEvent::Started {
            run_id: run_id.clone(),
        });
        tracing::info!(run_id = %run_id, route = %route.name, "test run started");

        let mut clients: Vec<Arc<dyn crate::client::BotClient>> = Vec::new();
        let mut skip_dispose: Vec<bool> = Vec::new();
        let outcome = self
            .drive(&run_id, &route, &harness, cancel, &mut clients, &mut skip_dispose)
            .await;

        let dispose_futures = clients
            .iter()
            .zip(skip_dispose.iter())
            .filter(|(_, skip)| !**skip)
            .map(|(client, _)| client.dispose());
        futures::future::join_all(dispose_futures).await;

        Ok(self.finalize(&run_id, outcome).await)
    }

    /// Requests cancellation of an active run by id. Returns `false` if
    /// no such active run exists.
    pub async fn stop(&self, run_id: &str) -> bool {
        match self.run_cancel_tokens.lock().await.get(run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Looks up a run by id among both active and completed runs.
    pub async fn get_run(&self, run_id: &str) -> Option<TestRun> {
        if let Some(run) = self.active.lock().await.get(run_id) {
            return Some(run.clone());
        }
        self.completed.lock().await.get(run_id).cloned()
    }

    pub async fn active_runs(&self) -> Vec<TestRun> {
        self.active.lock().await.values().cloned().collect()
    }

    pub async fn completed_runs(&self) -> Vec<TestRun> {
        self.completed.lock().await.values().cloned().collect()
    }

    async fn mutate_run<F: FnOnce(&mut TestRun)>(&self, run_id: &str, f: F) {
        if let Some(run) = self.active.lock().await.get_mut(run_id) {
            f(run);
        }
    }

    async fn read_run(&self, run_id: &str) -> Option<TestRun> {
        self.active.lock().await.get(run_id).cloned()
    }

    /// Steps 3-11 of the spec §4.3 algorithm: creates bots, starts
    /// them, waits for login, applies setup, restores a snapshot if
    /// configured, launches each bot's executor, and polls until every
    /// bot completes or the run times out / is cancelled.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run_id: &str,
        route: &TaskRoute,
        harness: &HarnessSettings,
        cancel: CancellationToken,
        clients: &mut Vec<Arc<dyn crate::client::BotClient>>,
        skip_dispose: &mut Vec<bool>,
    ) -> Result<(), TestRunError> {
        let bot_count = harness.bot_count as usize;
        let mut bot_names = Vec::with_capacity(bot_count);

        // Step 3: create bots.
        for i in 0..bot_count {
            let bot_name = format!("{}{}", harness.account_prefix, i + 1);
            let class = harness.class_for_bot(i);
            let client = self
                .services
                .bot_client_factory
                .create(&bot_name, &class, &harness.race)
                .await;
            self.mutate_run(run_id, |r| {
                r.bots.push(BotResult::new(bot_name.clone(), class.clone()))
            })
            .await;
            clients.push(client);
            skip_dispose.push(false);
            bot_names.push(bot_name);
        }

        // Step 4: start, staggered to avoid auth-server throttling.
        for (i, client) in clients.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TestRunError::Cancelled);
            }
            client.start().await;
            if i + 1 < clients.len() {
                tokio::time::sleep(BOT_START_STAGGER).await;
            }
        }

        // Step 5: wait until every bot has logged in.
        let setup_deadline = Instant::now() + Duration::from_secs(harness.setup_timeout_seconds);
        loop {
            if clients.iter().all(|c| c.logged_in()) {
                break;
            }
            if cancel.is_cancelled() {
                return Err(TestRunError::Cancelled);
            }
            if Instant::now() >= setup_deadline {
                let logged_in = clients.iter().filter(|c| c.logged_in()).count();
                return Err(TestRunError::LoginTimeout {
                    logged_in,
                    total: clients.len(),
                });
            }
            tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
        }

        // Step 6: capture character names.
        let mut character_names = Vec::with_capacity(bot_count);
        for (i, client) in clients.iter().enumerate() {
            let name = client
                .character_name()
                .ok_or_else(|| TestRunError::MissingCharacterName(bot_names[i].clone()))?;
            self.mutate_run(run_id, |r| r.bots[i].character_name = Some(name.clone()))
                .await;
            character_names.push(name);
        }

        // Step 7: apply harness setup, if there is anything to apply.
        if harness.needs_setup() {
            for (i, client) in clients.iter().enumerate() {
                let class = harness.class_for_bot(i);
                let setup = HarnessSetup {
                    level_ups: harness.level.saturating_sub(1),
                    items: harness.items.clone(),
                    completed_quests: harness.completed_quests.clone(),
                    start_position: harness.start_position,
                    equipment_set: harness.equipment_set_for_class(&class),
                };
                if !setup.is_empty() {
                    if let Err(e) = client.apply_harness_setup(&setup).await {
                        tracing::warn!(run_id = %run_id, bot = %bot_names[i], "harness setup failed: {e}");
                    }
                }
            }
            tokio::time::sleep(SETUP_SETTLE_GRACE).await;
        }

        // Step 8: optional snapshot restore, applied to the first bot's
        // character only (the companion bots are throwaway fleet
        // members; only the first is ever restored or saved, matching
        // step 12's save behavior).
        if let Some(snapshot_name) = &harness.restore_snapshot {
            match &self.services.snapshot_manager {
                Some(manager) => {
                    let character = &character_names[0];
                    let requires_offline = manager.store().requires_offline_for_restore();
                    if requires_offline {
                        clients[0].log_out().await;
                    }
                    if let Err(e) = manager.restore(snapshot_name, character).await {
                        tracing::warn!(run_id = %run_id, "snapshot restore failed: {e}");
                    }
                    if requires_offline {
                        clients[0].log_in().await;
                    }
                }
                None => {
                    tracing::warn!(
                        run_id = %run_id,
                        "restoreSnapshot set but no StateStore configured; proceeding without restoring"
                    );
                }
            }
        }

        // Step 9: transition to Running.
        self.mutate_run(run_id, |r| r.set_status(RunStatus::Running))
            .await;
        let _ = self.events_tx.send(RunEvent::StatusChanged {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
        });

        // Step 10: build a fresh executor per bot, subscribe before
        // activating, and launch its tick loop and event consumer.
        let executor_cancel = cancel.child_token();
        for (i, client) in clients.iter().enumerate() {
            let executor = TaskExecutor::new(route).map_err(TestRunError::RouteLoad)?;
            let mut events = executor.subscribe();

            let registry = self.active.clone();
            let events_tx = self.events_tx.clone();
            let run_id_owned = run_id.to_string();
            let bot_name = bot_names[i].clone();

            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(ExecutorEvent::TaskCompleted(t)) => {
                            let mut active = registry.lock().await;
                            if let Some(run) = active.get_mut(&run_id_owned) {
                                run.bots[i].task_results.push(TaskRecord {
                                    task_name: t.task_name,
                                    result: t.result,
                                    duration: t.duration,
                                    error_message: t.error_message,
                                });
                            }
                        }
                        Ok(ExecutorEvent::RouteCompleted(r)) => {
                            {
                                let mut active = registry.lock().await;
                                if let Some(run) = active.get_mut(&run_id_owned) {
                                    run.bots[i].success = r.success;
                                    run.bots[i].complete = true;
                                    run.bots[i].end_time = Some(chrono::Local::now());
                                }
                            }
                            let _ = events_tx.send(RunEvent::BotCompleted {
                                run_id: run_id_owned.clone(),
                                bot_name,
                                success: r.success,
                            });
                            break;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                run_id = %run_id_owned,
                                bot = i,
                                lagged = n,
                                "executor event receiver lagged"
                            );
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            tokio::spawn(executor.run_to_completion(client.clone(), executor_cancel.clone()));
        }

        // Step 11: poll until every bot completes, or time out / cancel.
        let test_deadline = Instant::now() + Duration::from_secs(harness.test_timeout_seconds);
        let mut last_status_emit = Instant::now();
        let poll_result = loop {
            if cancel.is_cancelled() {
                break Err(TestRunError::Cancelled);
            }
            let snapshot = self
                .read_run(run_id)
                .await
                .expect("run stays registered while active");
            if snapshot.bots_completed() == snapshot.bots.len() {
                break Ok(());
            }
            if Instant::now() >= test_deadline {
                break Err(TestRunError::Timeout(Duration::from_secs(
                    harness.test_timeout_seconds,
                )));
            }
            if last_status_emit.elapsed() >= STATUS_EMIT_INTERVAL {
                let _ = self.events_tx.send(RunEvent::StatusChanged {
                    run_id: run_id.to_string(),
                    status: RunStatus::Running,
                });
                last_status_emit = Instant::now();
            }
            tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
        };
        // Stop driving every bot's executor regardless of outcome
        // (spec §5: "running task executors are deactivated").
        executor_cancel.cancel();
        poll_result?;

        // Step 12 (success path): log out every bot, save a snapshot
        // from the first bot's character, and leave all bots logged out
        // rather than disposing them normally.
        if let Some(snapshot_name) = &harness.save_snapshot {
            if let Some(manager) = &self.services.snapshot_manager {
                let logout_futures = clients.iter().map(|client| client.log_out());
                futures::future::join_all(logout_futures).await;
                tokio::time::sleep(LOGOUT_GRACE).await;
                if let Err(e) = manager.save(snapshot_name, &character_names[0]).await {
                    tracing::warn!(run_id = %run_id, "snapshot save failed: {e}");
                }
                skip_dispose.iter_mut().for_each(|skip| *skip = true);
            } else {
                tracing::warn!(
                    run_id = %run_id,
                    "saveSnapshot set but no StateStore configured; skipping save"
                );
            }
        }

        Ok(())
    }

    /// Step 13: moves the run from `active` to `completed` under a
    /// single lock, setting its terminal status from the drive outcome,
    /// and emits `TestRunCompleted`. Infallible: once a run is
    /// registered it always finalizes to *some* terminal `TestRun`.
    async fn finalize(&self, run_id: &str, outcome: Result<(), TestRunError>) -> TestRun {
        let mut run = self
            .active
            .lock()
            .await
            .remove(run_id)
            .expect("run was registered in start_run before drive() ran");

        let (status, error_message) = match outcome {
            Ok(()) => {
                let failed = run.bots_failed();
                if failed > 0 {
                    (
                        RunStatus::Completed,
                        Some(format!("{failed}/{} bots failed", run.bots.len())),
                    )
                } else {
                    (RunStatus::Completed, None)
                }
            }
            Err(e @ TestRunError::Cancelled) => (RunStatus::Cancelled, Some(e.to_string())),
            Err(e @ TestRunError::Timeout(_)) => (RunStatus::TimedOut, Some(e.to_string())),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        run.error_message = error_message;
        run.set_status(status);
        let result = run.clone();

        self.completed.lock().await.insert(run_id.to_string(), run);
        self.run_cancel_tokens.lock().await.remove(run_id);

        let _ = self.events_tx.send(RunEvent::Completed {
            run_id: run_id.to_string(),
            status,
        });
        tracing::info!(run_id = %run_id, status = ?status, "test run completed");

        result
    }
}
