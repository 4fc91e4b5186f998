// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TaskRoute` and `HarnessSettings` (spec §3) and route-file loading
//! (spec §6).

use crate::client::Position;
use crate::errors::RouteLoadError;
use crate::task::{Task, TaskConfig, build_task};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// The declarative recipe attached to a route describing how to
/// instantiate bots for it (spec §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessSettings {
    pub bot_count: u32,
    pub account_prefix: String,
    pub classes: Vec<String>,
    pub race: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub items: Vec<crate::client::ItemGrant>,
    #[serde(default)]
    pub completed_quests: Vec<u32>,
    pub start_position: Option<Position>,
    #[serde(default = "default_setup_timeout")]
    pub setup_timeout_seconds: u64,
    #[serde(default = "default_test_timeout")]
    pub test_timeout_seconds: u64,
    pub restore_snapshot: Option<String>,
    pub save_snapshot: Option<String>,
    #[serde(default)]
    pub equipment_sets: Vec<String>,
    #[serde(default)]
    pub class_equipment_sets: std::collections::BTreeMap<String, Vec<String>>,
}

fn default_level() -> u32 {
    1
}
fn default_setup_timeout() -> u64 {
    120
}
fn default_test_timeout() -> u64 {
    600
}

impl HarnessSettings {
    /// Round-robin class assignment by bot index (spec §3).
    /// Defaults to "Warrior" if no classes are configured (spec §4.3).
    pub fn class_for_bot(&self, bot_index: usize) -> String {
        if self.classes.is_empty() {
            "Warrior".to_string()
        } else {
            self.classes[bot_index % self.classes.len()].clone()
        }
    }

    /// The equipment set for a bot of the given class, preferring
    /// `classEquipmentSets` over the flat `equipmentSets` fallback
    /// (spec §9 open question).
    pub fn equipment_set_for_class(&self, class: &str) -> Option<Vec<String>> {
        if let Some(set) = self.class_equipment_sets.get(class) {
            Some(set.clone())
        } else if !self.equipment_sets.is_empty() {
            Some(self.equipment_sets.clone())
        } else {
            None
        }
    }

    /// Whether harness setup has anything to apply at all (spec §4.3
    /// step 7: level>1, items, quests, or start position).
    pub fn needs_setup(&self) -> bool {
        self.level > 1
            || !self.items.is_empty()
            || !self.completed_quests.is_empty()
            || self.start_position.is_some()
    }
}

/// An immutable ordered list of tasks plus route-level flags (spec §3).
///
/// The route itself holds task *configuration*, not live [`Task`]
/// instances: a route is shared read-only across every bot in a test
/// run (spec §3, "immutable after load"), while each bot's
/// [`crate::executor::TaskExecutor`] needs its own mutable task state
/// (a `Wait` task's clock, an in-flight `TaskAction`, and so on). Each
/// executor calls [`TaskRoute::build_tasks`] to get a fresh, private
/// set of task instances.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRoute {
    pub name: String,
    pub description: Option<String>,
    pub loop_route: bool,
    pub harness: Option<HarnessSettings>,
    task_configs: Vec<TaskConfig>,
}

impl TaskRoute {
    pub fn task_count(&self) -> usize {
        self.task_configs.len()
    }

    /// A route with an empty task list cannot be activated (spec §3,
    /// §4.2, §8).
    pub fn is_executable(&self) -> bool {
        !self.task_configs.is_empty()
    }

    /// Builds a fresh, independent set of task instances from this
    /// route's configuration.
    pub fn build_tasks(&self) -> Result<Vec<Box<dyn Task>>, RouteLoadError> {
        self.task_configs
            .iter()
            .cloned()
            .map(build_task)
            .collect()
    }

    /// Projects this route back into its JSON wire shape (spec §8:
    /// "parse route JSON, serialize the resulting TaskRoute, parse
    /// again => structurally equal").
    fn to_route_file(&self) -> RouteFile {
        RouteFile {
            name: self.name.clone(),
            description: self.description.clone(),
            loop_route: self.loop_route,
            harness: self.harness.clone(),
            tasks: self.task_configs.clone(),
        }
    }

    /// Serializes this route back into route-file JSON bytes.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.to_route_file())
    }
}

/// The wire shape of a route JSON file (spec §6), also used to
/// serialize a [`TaskRoute`] back to JSON (spec §8 round-trip
/// property).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteFile {
    name: String,
    description: Option<String>,
    #[serde(default, rename = "loop")]
    loop_route: bool,
    harness: Option<HarnessSettings>,
    tasks: Vec<TaskConfig>,
}

/// Parses route JSON bytes into a [`TaskRoute`], building every task.
pub fn parse_route(path: &Utf8Path, bytes: &[u8]) -> Result<TaskRoute, RouteLoadError> {
    let file: RouteFile =
        serde_json::from_slice(bytes).map_err(|source| RouteLoadError::Parse {
            path: path.to_owned(),
            source,
        })?;
    // Validate every task config builds at least once so load-time
    // errors (unknown task types, malformed params) surface immediately
    // rather than when the first bot activates the route.
    for config in &file.tasks {
        build_task(config.clone())?;
    }
    Ok(TaskRoute {
        name: file.name,
        description: file.description,
        loop_route: file.loop_route,
        harness: file.harness,
        task_configs: file.tasks,
    })
}

/// Loads a route from disk, resolving `path` as absolute-if-rooted or
/// relative to `routes_dir` (spec §4.3 step 1).
pub async fn load_route(path: &Utf8Path, routes_dir: &Utf8Path) -> Result<TaskRoute, RouteLoadError> {
    let resolved = resolve_route_path(path, routes_dir)
        .ok_or_else(|| RouteLoadError::NotFound(path.to_owned()))?;
    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|_| RouteLoadError::NotFound(resolved.clone()))?;
    parse_route(&resolved, &bytes)
}

fn resolve_route_path(path: &Utf8Path, routes_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    if path.is_absolute() && path.exists() {
        return Some(path.to_owned());
    }
    let candidate = routes_dir.join(path);
    if candidate.exists() {
        return Some(candidate);
    }
    None
}

/// Requires `HarnessSettings` to be present and `botCount >= 1` before a
/// route can back a test run (spec §3, §8 boundary behavior).
pub fn require_test_harness(route: &TaskRoute) -> Result<&HarnessSettings, RouteLoadError> {
    if !route.is_executable() {
        return Err(RouteLoadError::EmptyRoute(route.name.clone()));
    }
    let harness = route
        .harness
        .as_ref()
        .ok_or_else(|| RouteLoadError::MissingHarness(route.name.clone()))?;
    if harness.bot_count == 0 {
        return Err(RouteLoadError::MissingHarness(format!(
            "{}: botCount must be >= 1",
            route.name
        )));
    }
    Ok(harness)
}
