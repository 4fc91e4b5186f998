// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end `TestSuiteCoordinator` scenarios (spec §8, scenarios 5-6).

mod common;

use common::{services, write_file};
use fleet_orchestrator::run::TestRunCoordinator;
use fleet_orchestrator::suite::{SuiteRunStatus, TestSuiteCoordinator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const HARNESS: &str = r#""harness": {
    "botCount": 1,
    "accountPrefix": "a_",
    "classes": ["Warrior"],
    "race": "Human",
    "level": 1,
    "setupTimeoutSeconds": 30,
    "testTimeoutSeconds": 30
}"#;

fn write_dependency_fixture(dir: &camino_tempfile::Utf8TempDir) -> camino::Utf8PathBuf {
    write_file(
        dir,
        "a.json",
        &format!(r#"{{"name": "a", "tasks": [{{"type": "AssertLevel", "minLevel": 99}}], {HARNESS}}}"#),
    );
    write_file(
        dir,
        "b.json",
        &format!(r#"{{"name": "b", "tasks": [{{"type": "LogMessage", "message": "b"}}], {HARNESS}}}"#),
    );
    write_file(
        dir,
        "c.json",
        &format!(r#"{{"name": "c", "tasks": [{{"type": "LogMessage", "message": "c"}}], {HARNESS}}}"#),
    );
    write_file(
        dir,
        "suite.json",
        r#"{
            "name": "dependency-suite",
            "tests": [
                {"route": "a.json"},
                {"route": "b.json", "dependsOn": ["a"]},
                {"route": "c.json", "dependsOn": ["a"]}
            ]
        }"#,
    )
}

#[tokio::test]
async fn sequential_suite_skips_dependents_of_a_failed_entry() {
    let dir = camino_tempfile::tempdir().unwrap();
    let suite_path = write_dependency_fixture(&dir);

    let run_coordinator = Arc::new(TestRunCoordinator::new(services(&dir)));
    let suite_coordinator = TestSuiteCoordinator::new(run_coordinator, services(&dir));

    let run = suite_coordinator
        .run_suite(&suite_path, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, SuiteRunStatus::Failed);
    assert_eq!(run.tests_passed, 0);
    assert_eq!(run.tests_failed, 1);
    assert_eq!(run.tests_skipped, 2);
}

#[tokio::test]
async fn parallel_suite_skips_dependents_of_a_failed_entry() {
    let dir = camino_tempfile::tempdir().unwrap();
    let suite_path = write_dependency_fixture(&dir);

    let run_coordinator = Arc::new(TestRunCoordinator::new(services(&dir)));
    let suite_coordinator = TestSuiteCoordinator::new(run_coordinator, services(&dir));

    let run = suite_coordinator
        .run_suite(&suite_path, true, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, SuiteRunStatus::Failed);
    assert_eq!(run.tests_passed, 0);
    assert_eq!(run.tests_failed, 1);
    assert_eq!(run.tests_skipped, 2);
}

#[tokio::test]
async fn cyclic_suite_is_rejected_before_any_run_registers() {
    let dir = camino_tempfile::tempdir().unwrap();
    write_file(
        &dir,
        "x.json",
        &format!(r#"{{"name": "x", "tasks": [{{"type": "LogMessage", "message": "x"}}], {HARNESS}}}"#),
    );
    write_file(
        &dir,
        "y.json",
        &format!(r#"{{"name": "y", "tasks": [{{"type": "LogMessage", "message": "y"}}], {HARNESS}}}"#),
    );
    let suite_path = write_file(
        &dir,
        "cycle.json",
        r#"{
            "name": "cyclic-suite",
            "tests": [
                {"route": "x.json", "dependsOn": ["y"]},
                {"route": "y.json", "dependsOn": ["x"]}
            ]
        }"#,
    );

    let run_coordinator = Arc::new(TestRunCoordinator::new(services(&dir)));
    let suite_coordinator = TestSuiteCoordinator::new(run_coordinator, services(&dir));

    let result = suite_coordinator
        .run_suite(&suite_path, false, CancellationToken::new())
        .await;
    assert!(result.is_err());
    assert!(suite_coordinator.get_run("nonexistent").await.is_none());
}
