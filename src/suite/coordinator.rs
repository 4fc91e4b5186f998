// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TestSuiteCoordinator` (spec §4.5): dependency-ordered execution of
//! many test runs, sequential or level-parallel.

use super::{SuiteEntry, SuiteRunStatus, TestSuite, TestSuiteRun, load_suite, resolve_suite_route_path};
use crate::errors::{SuiteLoadError, TestSuiteError};
use crate::events::SuiteEvent;
use crate::run::{RunStatus, Services, TestRun, TestRunCoordinator};
use camino::Utf8Path;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

type SuiteRegistry = Mutex<HashMap<String, TestSuiteRun>>;

/// The outcome of dispatching one suite entry, before it is folded into
/// the suite run's counters.
enum EntryOutcome {
    /// A dependency never passed (spec §4.5: either it failed, or it
    /// was itself skipped — the "not yet in either set" defensive case
    /// collapses into this one, since a skipped entry never joins
    /// `passed`).
    Skipped,
    /// The route could not be resolved, or the coordinator rejected it
    /// before registering a run (route load / missing harness).
    Unresolved(String),
    Ran(TestRun),
}

/// Orchestrates dependency-ordered execution of a [`TestSuite`] (spec
/// §4.5).
pub struct TestSuiteCoordinator {
    run_coordinator: Arc<TestRunCoordinator>,
    services: Services,
    active: Arc<SuiteRegistry>,
    completed: Arc<SuiteRegistry>,
    events_tx: tokio::sync::broadcast::Sender<SuiteEvent>,
}

impl TestSuiteCoordinator {
    pub fn new(run_coordinator: Arc<TestRunCoordinator>, services: Services) -> Self {
        let (events_tx, _rx) = crate::events::new_channel();
        Self {
            run_coordinator,
            services,
            active: Arc::new(Mutex::new(HashMap::new())),
            completed: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SuiteEvent> {
        self.events_tx.subscribe()
    }

    pub async fn get_run(&self, suite_run_id: &str) -> Option<TestSuiteRun> {
        if let Some(run) = self.active.lock().await.get(suite_run_id) {
            return Some(run.clone());
        }
        self.completed.lock().await.get(suite_run_id).cloned()
    }

    /// Loads and validates the suite, then drives it to completion
    /// (spec §4.5). Errors here occur strictly before a `TestSuiteRun`
    /// is registered — an invalid suite, such as one with a dependency
    /// cycle, is rejected before any run starts (spec §8 scenario 6).
    pub async fn run_suite(
        &self,
        suite_path: &Utf8Path,
        parallel: bool,
        cancel: CancellationToken,
    ) -> Result<TestSuiteRun, TestSuiteError> {
        let suite = load_suite(suite_path).await?;
        let errors = suite.validate();
        if !errors.is_empty() {
            return Err(SuiteLoadError::Invalid {
                name: suite.name.clone(),
                errors,
            }
            .into());
        }

        let mut run = TestSuiteRun::new(
            suite.name.clone(),
            suite_path.to_owned(),
            parallel,
            suite.entries.len(),
        );
        run.status = SuiteRunStatus::Running;
        let suite_run_id = run.id.clone();
        self.active.lock().await.insert(suite_run_id.clone(), run);
        let _ = self.events_tx.send(SuiteEvent::Started {
            suite_run_id: suite_run_id.clone(),
        });
        tracing::info!(suite_run_id = %suite_run_id, suite = %suite.name, "suite run started");

        let mut passed: HashSet<String> = HashSet::new();
        let mut cancelled = false;

        if parallel {
            for level in suite.execution_levels() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let entries: Vec<&SuiteEntry> = level
                    .iter()
                    .filter_map(|name| suite.entries.iter().find(|e| &e.name == name))
                    .collect();
                let outcomes = futures::future::join_all(entries.iter().map(|entry| {
                    self.dispatch_entry(suite_path, entry, &passed, cancel.child_token())
                }))
                .await;
                for (entry, outcome) in entries.iter().zip(outcomes) {
                    self.record_outcome(&suite_run_id, entry, outcome, &mut passed)
                        .await;
                }
            }
        } else {
            for name in suite.topological_order() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let entry = suite
                    .entries
                    .iter()
                    .find(|e| e.name == name)
                    .expect("topological order only contains known entries");
                let outcome = self
                    .dispatch_entry(suite_path, entry, &passed, cancel.child_token())
                    .await;
                self.record_outcome(&suite_run_id, entry, outcome, &mut passed)
                    .await;
            }
        }

        Ok(self.finalize(&suite_run_id, cancelled).await)
    }

    /// Decides whether an entry can run (spec §4.5: "can run iff every
    /// declared dependency is in `passedTests`"), resolves its route,
    /// and starts the underlying test run.
    async fn dispatch_entry(
        &self,
        suite_path: &Utf8Path,
        entry: &SuiteEntry,
        passed: &HashSet<String>,
        cancel: CancellationToken,
    ) -> EntryOutcome {
        if !entry.dependencies.iter().all(|d| passed.contains(d)) {
            return EntryOutcome::Skipped;
        }

        let Some(resolved) = resolve_suite_route_path(&entry.route, suite_path, &self.services.routes_dir)
        else {
            return EntryOutcome::Unresolved(
                SuiteLoadError::UnresolvedRoute {
                    entry: entry.name.clone(),
                    route: entry.route.clone(),
                }
                .to_string(),
            );
        };

        match self.run_coordinator.start_run(&resolved, cancel).await {
            Ok(run) => EntryOutcome::Ran(run),
            Err(e) => EntryOutcome::Unresolved(e.to_string()),
        }
    }

    /// Folds one entry's outcome into the suite run's counters and the
    /// running `passed` set (spec §3: an entry is passed iff its
    /// `TestRun` is `Completed` with `botsFailed == 0`).
    async fn record_outcome(
        &self,
        suite_run_id: &str,
        entry: &SuiteEntry,
        outcome: EntryOutcome,
        passed: &mut HashSet<String>,
    ) {
        match outcome {
            EntryOutcome::Skipped => {
                self.mutate(suite_run_id, |r| r.tests_skipped += 1).await;
            }
            EntryOutcome::Unresolved(message) => {
                tracing::warn!(suite_run_id = %suite_run_id, entry = %entry.name, "{message}");
                self.mutate(suite_run_id, |r| r.tests_failed += 1).await;
            }
            EntryOutcome::Ran(run) => {
                let entry_passed = run.status == RunStatus::Completed && run.bots_failed() == 0;
                if entry_passed {
                    passed.insert(entry.name.clone());
                }
                self.mutate(suite_run_id, |r| {
                    if entry_passed {
                        r.tests_passed += 1;
                    } else {
                        r.tests_failed += 1;
                    }
                    r.test_runs.push(run);
                })
                .await;
            }
        }
    }

    async fn mutate<F: FnOnce(&mut TestSuiteRun)>(&self, suite_run_id: &str, f: F) {
        if let Some(run) = self.active.lock().await.get_mut(suite_run_id) {
            f(run);
        }
    }

    /// Moves the run from `active` to `completed`, sets its terminal
    /// status (spec §4.5: "`Completed` iff `testsFailed == 0` and
    /// `testsSkipped == 0`; else `Failed`"), and emits `SuiteCompleted`.
    async fn finalize(&self, suite_run_id: &str, cancelled: bool) -> TestSuiteRun {
        let mut run = self
            .active
            .lock()
            .await
            .remove(suite_run_id)
            .expect("suite run was registered in run_suite before dispatch ran");

        run.status = if cancelled {
            SuiteRunStatus::Cancelled
        } else if run.tests_failed == 0 && run.tests_skipped == 0 {
            SuiteRunStatus::Completed
        } else {
            SuiteRunStatus::Failed
        };
        run.end_time = Some(chrono::Local::now());
        let result = run.clone();

        self.completed
            .lock()
            .await
            .insert(suite_run_id.to_string(), run);
        let _ = self.events_tx.send(SuiteEvent::Completed {
            suite_run_id: suite_run_id.to_string(),
            status: result.status,
        });
        tracing::info!(suite_run_id = %suite_run_id, status = ?result.status, "suite run completed");

        result
    }
}
