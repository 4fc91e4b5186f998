// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TestSuite`: a DAG of named test entries with dependency edges
//! (spec §3, §4.4).

mod coordinator;

pub use coordinator::TestSuiteCoordinator;

use crate::errors::SuiteLoadError;
use crate::run::TestRun;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The lifecycle status of a [`TestSuiteRun`] (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SuiteRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One execution of a [`TestSuite`] (spec §3).
#[derive(Clone, Debug, Serialize)]
pub struct TestSuiteRun {
    pub id: String,
    pub name: String,
    pub path: Utf8PathBuf,
    pub parallel: bool,
    pub status: SuiteRunStatus,
    pub test_runs: Vec<TestRun>,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub tests_skipped: usize,
    pub total_tests: usize,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
}

impl TestSuiteRun {
    pub(crate) fn new(name: String, path: Utf8PathBuf, parallel: bool, total_tests: usize) -> Self {
        Self {
            id: crate::run::random_id(),
            name,
            path,
            parallel,
            status: SuiteRunStatus::Pending,
            test_runs: Vec::new(),
            tests_passed: 0,
            tests_failed: 0,
            tests_skipped: 0,
            total_tests,
            start_time: Local::now(),
            end_time: None,
        }
    }
}

/// One entry in a [`TestSuite`] (spec §3, §6).
///
/// `name` is derived from the route file's stem, not declared
/// separately, matching spec §3: "Name of an entry is derived from its
/// route's file stem."
#[derive(Clone, Debug)]
pub struct SuiteEntry {
    pub name: String,
    pub route: String,
    pub dependencies: Vec<String>,
}

/// A DAG of named test entries with dependency edges (spec §3, §4.4).
#[derive(Clone, Debug)]
pub struct TestSuite {
    pub name: String,
    pub entries: Vec<SuiteEntry>,
}

impl TestSuite {
    /// Returns the list of validation errors; an empty list means the
    /// suite is valid (spec §3: non-empty routes, known dependencies,
    /// acyclic graph).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let names: std::collections::HashSet<&str> =
            self.entries.iter().map(|e| e.name.as_str()).collect();

        for entry in &self.entries {
            if entry.route.trim().is_empty() {
                errors.push(format!("entry `{}` has an empty route", entry.name));
            }
            for dep in &entry.dependencies {
                if !names.contains(dep.as_str()) {
                    errors.push(format!(
                        "entry `{}` depends on unknown entry `{dep}`",
                        entry.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            if let Err(e) = self.build_graph() {
                errors.push(e);
            }
        }
        errors
    }

    fn build_graph(&self) -> Result<DiGraph<String, ()>, String> {
        let mut graph = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for entry in &self.entries {
            indices.insert(&entry.name, graph.add_node(entry.name.clone()));
        }
        for entry in &self.entries {
            let to = indices[entry.name.as_str()];
            for dep in &entry.dependencies {
                if let Some(&from) = indices.get(dep.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        toposort(&graph, None)
            .map(|_| graph)
            .map_err(|_| format!("suite `{}` has a cyclic dependency graph", self.name))
    }

    /// Kahn-style grouping by longest dependency path (spec §4.4): level
    /// 0 holds every entry with no dependencies; level *k* holds every
    /// entry whose dependencies are all in levels `< k`.
    pub fn execution_levels(&self) -> Vec<Vec<String>> {
        let mut level_of: HashMap<String, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut remaining: Vec<&SuiteEntry> = self.entries.iter().collect();

        while !remaining.is_empty() {
            let mut next_remaining = Vec::new();
            let mut progressed = false;
            for entry in remaining {
                if entry.dependencies.iter().all(|d| level_of.contains_key(d)) {
                    let level = entry
                        .dependencies
                        .iter()
                        .map(|d| level_of[d] + 1)
                        .max()
                        .unwrap_or(0);
                    level_of.insert(entry.name.clone(), level);
                    while levels.len() <= level {
                        levels.push(Vec::new());
                    }
                    levels[level].push(entry.name.clone());
                    progressed = true;
                } else {
                    next_remaining.push(entry);
                }
            }
            if !progressed {
                // Defense in depth: validate() already rejects cycles.
                tracing::warn!(suite = %self.name, "executionLevels made no progress, likely a cycle");
                break;
            }
            remaining = next_remaining;
        }
        levels
    }

    /// Flattens [`TestSuite::execution_levels`] in order, preserving
    /// insertion order within a level (spec §4.4).
    pub fn topological_order(&self) -> Vec<String> {
        self.execution_levels().into_iter().flatten().collect()
    }
}

#[derive(Deserialize)]
struct SuiteEntryFile {
    route: String,
    #[serde(default, rename = "dependsOn")]
    depends_on: Vec<String>,
}

#[derive(Deserialize)]
struct SuiteFile {
    name: String,
    tests: Vec<SuiteEntryFile>,
}

fn entry_name_from_route(route: &str) -> String {
    Utf8Path::new(route)
        .file_stem()
        .map(str::to_string)
        .unwrap_or_else(|| route.to_string())
}

/// Parses suite JSON bytes into a [`TestSuite`] (spec §6).
pub fn parse_suite(path: &Utf8Path, bytes: &[u8]) -> Result<TestSuite, SuiteLoadError> {
    let file: SuiteFile = serde_json::from_slice(bytes).map_err(|source| SuiteLoadError::Parse {
        path: path.to_owned(),
        source,
    })?;
    let entries = file
        .tests
        .into_iter()
        .map(|t| SuiteEntry {
            name: entry_name_from_route(&t.route),
            route: t.route,
            dependencies: t.depends_on,
        })
        .collect();
    Ok(TestSuite {
        name: file.name,
        entries,
    })
}

/// Loads a suite file from disk at `path` (given directly, unlike
/// routes which resolve against a configured directory).
pub async fn load_suite(path: &Utf8Path) -> Result<TestSuite, SuiteLoadError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| SuiteLoadError::NotFound(path.to_owned()))?;
    parse_suite(path, &bytes)
}

/// Resolves a suite entry's route path per spec §4.5: absolute if
/// rooted and exists, else relative to the suite file's directory, else
/// relative to the routes root (the suite directory's parent), else
/// relative to the configured routes directory. First hit wins.
pub(crate) fn resolve_suite_route_path(
    route: &str,
    suite_path: &Utf8Path,
    routes_dir: &Utf8Path,
) -> Option<Utf8PathBuf> {
    let candidate = Utf8Path::new(route);
    if candidate.is_absolute() && candidate.exists() {
        return Some(candidate.to_owned());
    }

    let suite_dir = suite_path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let by_suite_dir = suite_dir.join(route);
    if by_suite_dir.exists() {
        return Some(by_suite_dir);
    }

    if let Some(routes_root) = suite_dir.parent() {
        let by_routes_root = routes_root.join(route);
        if by_routes_root.exists() {
            return Some(by_routes_root);
        }
    }

    let by_configured_dir = routes_dir.join(route);
    if by_configured_dir.exists() {
        return Some(by_configured_dir);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(json: &str) -> TestSuite {
        parse_suite(Utf8Path::new("<test>"), json.as_bytes()).expect("suite parses")
    }

    #[test]
    fn validate_accepts_an_acyclic_dag() {
        let s = suite(
            r#"{"name":"s","tests":[
                {"route":"a.json"},
                {"route":"b.json","dependsOn":["a"]},
                {"route":"c.json","dependsOn":["a"]}
            ]}"#,
        );
        assert!(s.validate().is_empty());
        assert_eq!(s.topological_order().len(), 3);
    }

    #[test]
    fn validate_rejects_a_cycle() {
        let s = suite(
            r#"{"name":"s","tests":[
                {"route":"a.json","dependsOn":["b"]},
                {"route":"b.json","dependsOn":["a"]}
            ]}"#,
        );
        assert!(!s.validate().is_empty());
    }

    #[test]
    fn validate_rejects_an_unknown_dependency() {
        let s = suite(r#"{"name":"s","tests":[{"route":"a.json","dependsOn":["ghost"]}]}"#);
        let errors = s.validate();
        assert!(errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn execution_levels_group_by_longest_dependency_path() {
        let s = suite(
            r#"{"name":"s","tests":[
                {"route":"a.json"},
                {"route":"b.json","dependsOn":["a"]},
                {"route":"c.json","dependsOn":["a"]}
            ]}"#,
        );
        let levels = s.execution_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], vec!["a".to_string()]);
        assert_eq!(levels[1].len(), 2);
    }

    #[test]
    fn entry_name_is_the_route_file_stem() {
        let s = suite(r#"{"name":"s","tests":[{"route":"routes/kill_mobs.json"}]}"#);
        assert_eq!(s.entries[0].name, "kill_mobs");
    }
}
