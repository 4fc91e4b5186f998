// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the coordinator-level integration tests.

use async_trait::async_trait;
use camino::Utf8Path;
use fleet_orchestrator::client::{BotClient, BotClientFactory, HarnessSetup, TaskAction, TaskActionProgress};
use fleet_orchestrator::errors::RouteLoadError;
use fleet_orchestrator::executor::TaskExecutor;
use fleet_orchestrator::route::TaskRoute;
use fleet_orchestrator::run::Services;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub struct FakeBotClient {
    level: u32,
    character_name: String,
}

#[async_trait]
impl BotClient for FakeBotClient {
    async fn start(&self) {}
    async fn exit(&self) {}
    fn connected(&self) -> bool {
        true
    }
    fn logged_in(&self) -> bool {
        true
    }
    fn character_name(&self) -> Option<String> {
        Some(self.character_name.clone())
    }
    async fn apply_harness_setup(&self, _setup: &HarnessSetup) -> Result<(), String> {
        Ok(())
    }
    async fn load_route(&self, _path: &Utf8Path) -> Result<TaskExecutor, RouteLoadError> {
        unimplemented!("coordinator builds executors directly from the parsed route")
    }
    fn load_parsed_route(&self, route: TaskRoute) -> TaskExecutor {
        TaskExecutor::new(&route).expect("route builds")
    }
    async fn log_out(&self) {}
    async fn log_in(&self) {}
    async fn dispose(&self) {}
    async fn drive_task_action(&self, _action: &TaskAction) -> TaskActionProgress {
        TaskActionProgress::Success
    }
    fn level(&self) -> u32 {
        self.level
    }
    fn has_quest_in_log(&self, _quest_id: u32) -> bool {
        false
    }
    fn has_item(&self, _entry: u32, _count: u32) -> bool {
        false
    }
}

pub struct FakeFactory {
    next_id: AtomicU32,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }
}

#[async_trait]
impl BotClientFactory for FakeFactory {
    async fn create(&self, _account_name: &str, _class: &str, _race: &str) -> Arc<dyn BotClient> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeBotClient {
            level: 1,
            character_name: format!("Char{id}"),
        })
    }
}

pub fn write_file(dir: &camino_tempfile::Utf8TempDir, file_name: &str, body: &str) -> camino::Utf8PathBuf {
    let path = dir.path().join(file_name);
    std::fs::write(&path, body).unwrap();
    path
}

pub fn services(dir: &camino_tempfile::Utf8TempDir) -> Services {
    Services::new(dir.path().to_owned(), Arc::new(FakeFactory::new()))
}
