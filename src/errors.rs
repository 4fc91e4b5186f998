// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the orchestrator.
//!
//! Each failure kind in the error-handling design (spec §7) gets its
//! own `thiserror` type; [`OrchestratorError`] unifies the ones that
//! can surface from a coordinator's public entry points.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Error returned when a route file cannot be loaded or is structurally
/// invalid.
#[derive(Debug, Error)]
pub enum RouteLoadError {
    /// The route file could not be found at any resolved path.
    #[error("route file not found: {0}")]
    NotFound(Utf8PathBuf),

    /// The route file's contents failed to parse as JSON or did not
    /// match the route schema (includes unknown task types).
    #[error("failed to parse route at `{path}`")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The route has no tasks, so it cannot be activated.
    #[error("route `{0}` has no tasks and cannot be activated")]
    EmptyRoute(String),

    /// The route has no `harness` settings, so it cannot be used to
    /// start a test run.
    #[error("route `{0}` has no harness settings and cannot be used as a test")]
    MissingHarness(String),
}

/// Error returned when a suite file cannot be loaded or its dependency
/// graph is invalid.
#[derive(Debug, Error)]
pub enum SuiteLoadError {
    #[error("suite file not found: {0}")]
    NotFound(Utf8PathBuf),

    #[error("failed to parse suite at `{path}`")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The suite's entries failed [`crate::suite::TestSuite::validate`].
    #[error("suite `{name}` failed validation: {}", .errors.join("; "))]
    Invalid { name: String, errors: Vec<String> },

    /// A suite entry's route could not be resolved against any of the
    /// candidate roots (spec §4.5 path resolution).
    #[error("could not resolve route `{route}` for suite entry `{entry}`")]
    UnresolvedRoute { entry: String, route: String },
}

/// Error returned by [`crate::run::TestRunCoordinator::start_run`].
#[derive(Debug, Error)]
pub enum TestRunError {
    #[error(transparent)]
    RouteLoad(#[from] RouteLoadError),

    /// Not enough bots logged in before `setupTimeoutSeconds` elapsed.
    #[error("{logged_in}/{total} bots logged in before the setup timeout")]
    LoginTimeout { logged_in: usize, total: usize },

    /// A bot that should have a character name after login does not.
    #[error("bot `{0}` has no character name after login")]
    MissingCharacterName(String),

    /// The test run exceeded `testTimeoutSeconds` before all bots
    /// completed their route.
    #[error("test run timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The run's cancellation token was triggered.
    #[error("test run was cancelled")]
    Cancelled,

    /// A collaborator (BotClient/AdminChannel/StateStore) returned an
    /// error that the coordinator could not recover from.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Error returned by [`crate::suite::TestSuiteCoordinator::run_suite`].
#[derive(Debug, Error)]
pub enum TestSuiteError {
    #[error(transparent)]
    SuiteLoad(#[from] SuiteLoadError),

    #[error("suite run was cancelled")]
    Cancelled,
}

/// Top-level error type unifying every failure mode the crate exposes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    RouteLoad(#[from] RouteLoadError),

    #[error(transparent)]
    SuiteLoad(#[from] SuiteLoadError),

    #[error(transparent)]
    TestRun(#[from] TestRunError),

    #[error(transparent)]
    TestSuite(#[from] TestSuiteError),
}
