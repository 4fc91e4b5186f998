// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete task kinds (spec §3).
//!
//! Each kind implements [`TaskBody`] only — the pre/post delay latch
//! is supplied generically by [`DelayedTask`]. What a task actually
//! does in-game (pathfinding, combat, dialog) is delegated to
//! [`BotClient::drive_task_action`]; these bodies only know the
//! declared parameters and how to interpret progress.

use super::{DelayConfig, DelayedTask, Task, TaskBody, TaskResult};
use crate::client::{BotClient, Position, TaskAction, TaskActionProgress};
use crate::errors::RouteLoadError;
use crate::time::{StopwatchStart, stopwatch};
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The raw, untyped shape every task object in a route file has before
/// its `type`-specific parameters are parsed (spec §6).
///
/// Also the shape a [`crate::route::TaskRoute`] serializes its tasks
/// back into, so a route can round-trip through JSON (spec §8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub name: Option<String>,
    #[serde(default)]
    pub pre_delay_seconds: f64,
    #[serde(default)]
    pub post_delay_seconds: f64,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

/// The discriminant used by the route file's `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Wait,
    LogMessage,
    MoveToLocation,
    MoveToNPC,
    TalkToNPC,
    AcceptQuest,
    TurnInQuest,
    KillMobs,
    UseObject,
    Adventure,
    LearnSpells,
    AssertQuestInLog,
    AssertQuestNotInLog,
    AssertHasItem,
    AssertLevel,
}

impl TaskKind {
    fn default_name(self) -> &'static str {
        match self {
            TaskKind::Wait => "Wait",
            TaskKind::LogMessage => "LogMessage",
            TaskKind::MoveToLocation => "MoveToLocation",
            TaskKind::MoveToNPC => "MoveToNPC",
            TaskKind::TalkToNPC => "TalkToNPC",
            TaskKind::AcceptQuest => "AcceptQuest",
            TaskKind::TurnInQuest => "TurnInQuest",
            TaskKind::KillMobs => "KillMobs",
            TaskKind::UseObject => "UseObject",
            TaskKind::Adventure => "Adventure",
            TaskKind::LearnSpells => "LearnSpells",
            TaskKind::AssertQuestInLog => "AssertQuestInLog",
            TaskKind::AssertQuestNotInLog => "AssertQuestNotInLog",
            TaskKind::AssertHasItem => "AssertHasItem",
            TaskKind::AssertLevel => "AssertLevel",
        }
    }
}

/// Parses a route-file task object into the boxed [`Task`] the
/// executor drives. Unknown task types are a load-time error (spec §6).
pub fn build_task(config: TaskConfig) -> Result<Box<dyn Task>, RouteLoadError> {
    let name = config
        .name
        .unwrap_or_else(|| config.kind.default_name().to_string());
    let delays = DelayConfig {
        pre_delay_seconds: config.pre_delay_seconds,
        post_delay_seconds: config.post_delay_seconds,
    };
    let task_label = name.clone();
    let parse_err = move |source: serde_json::Error| RouteLoadError::Parse {
        path: Utf8PathBuf::from(format!("<task {task_label}>")),
        source,
    };

    macro_rules! build {
        ($params_ty:ty, $body_ctor:expr) => {{
            let params: $params_ty =
                serde_json::from_value(config.params.clone()).map_err(parse_err)?;
            let body = ($body_ctor)(params);
            Ok(Box::new(DelayedTask::new(name, body, delays)) as Box<dyn Task>)
        }};
    }

    match config.kind {
        TaskKind::Wait => build!(WaitParams, WaitBody::new),
        TaskKind::LogMessage => build!(LogMessageParams, LogMessageBody::new),
        TaskKind::MoveToLocation => build!(MoveToLocationParams, ActionBody::from),
        TaskKind::MoveToNPC => build!(MoveToNpcParams, ActionBody::from),
        TaskKind::TalkToNPC => build!(TalkToNpcParams, ActionBody::from),
        TaskKind::AcceptQuest => build!(AcceptQuestParams, ActionBody::from),
        TaskKind::TurnInQuest => build!(TurnInQuestParams, ActionBody::from),
        TaskKind::KillMobs => build!(KillMobsParams, ActionBody::from),
        TaskKind::UseObject => build!(UseObjectParams, ActionBody::from),
        TaskKind::Adventure => build!(AdventureParams, ActionBody::from),
        TaskKind::LearnSpells => build!(LearnSpellsParams, ActionBody::from),
        TaskKind::AssertQuestInLog => build!(AssertQuestInLogParams, AssertQuestInLogBody::new),
        TaskKind::AssertQuestNotInLog => {
            build!(AssertQuestNotInLogParams, AssertQuestNotInLogBody::new)
        }
        TaskKind::AssertHasItem => build!(AssertHasItemParams, AssertHasItemBody::new),
        TaskKind::AssertLevel => build!(AssertLevelParams, AssertLevelBody::new),
    }
}

// --- Wait -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WaitParams {
    seconds: f64,
}

struct WaitBody {
    target: Duration,
    clock: Option<StopwatchStart>,
}

impl WaitBody {
    fn new(params: WaitParams) -> Self {
        Self {
            target: Duration::from_secs_f64(params.seconds.max(0.0)),
            clock: None,
        }
    }
}

#[async_trait]
impl TaskBody for WaitBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        self.clock = Some(stopwatch());
        true
    }

    async fn update_body(&mut self, _client: &dyn BotClient) -> TaskResult {
        let elapsed = self
            .clock
            .as_ref()
            .map(|c| c.snapshot().active)
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.target {
            TaskResult::Success
        } else {
            TaskResult::Running
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        None
    }
}

// --- LogMessage ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogMessageParams {
    message: String,
}

struct LogMessageBody {
    message: String,
}

impl LogMessageBody {
    fn new(params: LogMessageParams) -> Self {
        Self {
            message: params.message,
        }
    }
}

#[async_trait]
impl TaskBody for LogMessageBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, _client: &dyn BotClient) -> TaskResult {
        tracing::info!(message = %self.message, "LogMessage task");
        TaskResult::Success
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        None
    }
}

// --- Generic in-game action tasks ---------------------------------------

#[derive(Debug, Deserialize)]
struct MoveToLocationParams {
    position: Position,
}
impl From<MoveToLocationParams> for ActionBody {
    fn from(p: MoveToLocationParams) -> Self {
        ActionBody::new(TaskAction::MoveToLocation { position: p.position })
    }
}

#[derive(Debug, Deserialize)]
struct MoveToNpcParams {
    npc_id: u32,
}
impl From<MoveToNpcParams> for ActionBody {
    fn from(p: MoveToNpcParams) -> Self {
        ActionBody::new(TaskAction::MoveToNpc { npc_id: p.npc_id })
    }
}

#[derive(Debug, Deserialize)]
struct TalkToNpcParams {
    npc_id: u32,
}
impl From<TalkToNpcParams> for ActionBody {
    fn from(p: TalkToNpcParams) -> Self {
        ActionBody::new(TaskAction::TalkToNpc { npc_id: p.npc_id })
    }
}

#[derive(Debug, Deserialize)]
struct AcceptQuestParams {
    quest_id: u32,
}
impl From<AcceptQuestParams> for ActionBody {
    fn from(p: AcceptQuestParams) -> Self {
        ActionBody::new(TaskAction::AcceptQuest { quest_id: p.quest_id })
    }
}

#[derive(Debug, Deserialize)]
struct TurnInQuestParams {
    quest_id: u32,
}
impl From<TurnInQuestParams> for ActionBody {
    fn from(p: TurnInQuestParams) -> Self {
        ActionBody::new(TaskAction::TurnInQuest { quest_id: p.quest_id })
    }
}

#[derive(Debug, Deserialize)]
struct KillMobsParams {
    entry: u32,
    count: u32,
}
impl From<KillMobsParams> for ActionBody {
    fn from(p: KillMobsParams) -> Self {
        ActionBody::new(TaskAction::KillMobs {
            entry: p.entry,
            count: p.count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UseObjectParams {
    entry: u32,
}
impl From<UseObjectParams> for ActionBody {
    fn from(p: UseObjectParams) -> Self {
        ActionBody::new(TaskAction::UseObject { entry: p.entry })
    }
}

#[derive(Debug, Deserialize)]
struct AdventureParams {
    script: String,
}
impl From<AdventureParams> for ActionBody {
    fn from(p: AdventureParams) -> Self {
        ActionBody::new(TaskAction::Adventure { script: p.script })
    }
}

#[derive(Debug, Deserialize)]
struct LearnSpellsParams {
    spell_ids: Vec<u32>,
}
impl From<LearnSpellsParams> for ActionBody {
    fn from(p: LearnSpellsParams) -> Self {
        ActionBody::new(TaskAction::LearnSpells {
            spell_ids: p.spell_ids,
        })
    }
}

/// Shared body for every task that just hands an opaque [`TaskAction`]
/// to the client and polls its progress.
struct ActionBody {
    action: TaskAction,
    error_message: Option<String>,
}

impl ActionBody {
    fn new(action: TaskAction) -> Self {
        Self {
            action,
            error_message: None,
        }
    }
}

#[async_trait]
impl TaskBody for ActionBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult {
        match client.drive_task_action(&self.action).await {
            TaskActionProgress::Running => TaskResult::Running,
            TaskActionProgress::Success => TaskResult::Success,
            TaskActionProgress::Failed(message) => {
                self.error_message = Some(message);
                TaskResult::Failed
            }
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

// --- Assert tasks ---------------------------------------------------------
//
// "Assert tasks are pure predicates over client state; on failure their
// message is the user-provided string augmented with the observed
// value." (spec §4.1)

#[derive(Debug, Deserialize)]
struct AssertQuestInLogParams {
    quest_id: u32,
    message: Option<String>,
}

struct AssertQuestInLogBody {
    quest_id: u32,
    message: Option<String>,
    error_message: Option<String>,
}

impl AssertQuestInLogBody {
    fn new(params: AssertQuestInLogParams) -> Self {
        Self {
            quest_id: params.quest_id,
            message: params.message,
            error_message: None,
        }
    }
}

#[async_trait]
impl TaskBody for AssertQuestInLogBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult {
        if client.has_quest_in_log(self.quest_id) {
            TaskResult::Success
        } else {
            let prefix = self
                .message
                .clone()
                .unwrap_or_else(|| format!("expected quest {} in log", self.quest_id));
            self.error_message = Some(format!("{prefix} (quest {} not in log)", self.quest_id));
            TaskResult::Failed
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct AssertQuestNotInLogParams {
    quest_id: u32,
    message: Option<String>,
}

struct AssertQuestNotInLogBody {
    quest_id: u32,
    message: Option<String>,
    error_message: Option<String>,
}

impl AssertQuestNotInLogBody {
    fn new(params: AssertQuestNotInLogParams) -> Self {
        Self {
            quest_id: params.quest_id,
            message: params.message,
            error_message: None,
        }
    }
}

#[async_trait]
impl TaskBody for AssertQuestNotInLogBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult {
        if !client.has_quest_in_log(self.quest_id) {
            TaskResult::Success
        } else {
            let prefix = self
                .message
                .clone()
                .unwrap_or_else(|| format!("expected quest {} not in log", self.quest_id));
            self.error_message = Some(format!("{prefix} (quest {} is in log)", self.quest_id));
            TaskResult::Failed
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct AssertHasItemParams {
    entry: u32,
    #[serde(default = "default_item_count")]
    count: u32,
    message: Option<String>,
}

fn default_item_count() -> u32 {
    1
}

struct AssertHasItemBody {
    entry: u32,
    count: u32,
    message: Option<String>,
    error_message: Option<String>,
}

impl AssertHasItemBody {
    fn new(params: AssertHasItemParams) -> Self {
        Self {
            entry: params.entry,
            count: params.count,
            message: params.message,
            error_message: None,
        }
    }
}

#[async_trait]
impl TaskBody for AssertHasItemBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult {
        if client.has_item(self.entry, self.count) {
            TaskResult::Success
        } else {
            let prefix = self.message.clone().unwrap_or_else(|| {
                format!("expected at least {} of item {}", self.count, self.entry)
            });
            self.error_message = Some(format!(
                "{prefix} (item {} not found in required quantity)",
                self.entry
            ));
            TaskResult::Failed
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct AssertLevelParams {
    #[serde(rename = "minLevel")]
    min_level: u32,
    message: Option<String>,
}

struct AssertLevelBody {
    min_level: u32,
    message: Option<String>,
    error_message: Option<String>,
}

impl AssertLevelBody {
    fn new(params: AssertLevelParams) -> Self {
        Self {
            min_level: params.min_level,
            message: params.message,
            error_message: None,
        }
    }
}

#[async_trait]
impl TaskBody for AssertLevelBody {
    async fn start_body(&mut self, _client: &dyn BotClient) -> bool {
        true
    }

    async fn update_body(&mut self, client: &dyn BotClient) -> TaskResult {
        let observed = client.level();
        if observed >= self.min_level {
            TaskResult::Success
        } else {
            let prefix = self
                .message
                .clone()
                .unwrap_or_else(|| format!("expected level >= {}", self.min_level));
            self.error_message = Some(format!("{prefix} (observed level {observed})"));
            TaskResult::Failed
        }
    }

    async fn cleanup_body(&mut self, _client: &dyn BotClient) {}

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
