// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `BotClient` collaborator contract (spec §6).
//!
//! `BotClient` is an opaque handle to one logged-in game client. The
//! orchestrator never constructs wire-protocol packets or admin-channel
//! command strings itself; it only calls through this trait. A concrete
//! implementation lives outside this crate (it owns the navmesh
//! pathfinding, opcode serialization, and so on).

use crate::errors::RouteLoadError;
use crate::executor::TaskExecutor;
use crate::route::TaskRoute;
use async_trait::async_trait;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

/// A position in the game world, used for `startPosition` and for
/// snapshot state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub map_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub orientation: f32,
}

/// One item grant: an item entry id and a count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGrant {
    pub entry: u32,
    pub count: u32,
}

/// The setup recipe handed to [`BotClient::apply_harness_setup`],
/// derived from a bot's slice of [`crate::route::HarnessSettings`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessSetup {
    /// Levels to add on top of the bot's starting level of 1.
    pub level_ups: u32,
    pub items: Vec<ItemGrant>,
    pub completed_quests: Vec<u32>,
    pub start_position: Option<Position>,
    /// Equipment set to apply, already resolved from
    /// `classEquipmentSets` (falling back to `equipmentSets`) for this
    /// bot's class. Opaque to the orchestrator; interpreted by the
    /// client implementation.
    pub equipment_set: Option<Vec<String>>,
}

impl HarnessSetup {
    /// An empty setup is a no-op: per spec §8, it must produce the same
    /// final character state as skipping setup entirely.
    pub fn is_empty(&self) -> bool {
        self.level_ups == 0
            && self.items.is_empty()
            && self.completed_quests.is_empty()
            && self.start_position.is_none()
            && self.equipment_set.is_none()
    }
}

/// The in-game action a non-assert, non-wait task wants performed.
///
/// This is the seam spec §1 draws around concrete task implementations:
/// "what a KillMobs task actually does in-game is the client's
/// concern". The orchestrator only knows the action's declared
/// parameters and polls for progress; pathfinding, combat, and dialog
/// logic live entirely in the `BotClient` implementation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskAction {
    MoveToLocation { position: Position },
    MoveToNpc { npc_id: u32 },
    TalkToNpc { npc_id: u32 },
    AcceptQuest { quest_id: u32 },
    TurnInQuest { quest_id: u32 },
    KillMobs { entry: u32, count: u32 },
    UseObject { entry: u32 },
    Adventure { script: String },
    LearnSpells { spell_ids: Vec<u32> },
}

/// The outcome of one poll of an in-flight [`TaskAction`].
#[derive(Clone, Debug, PartialEq)]
pub enum TaskActionProgress {
    Running,
    Success,
    Failed(String),
}

/// Opaque handle to one logged-in (or logging-in) game client.
///
/// Implementations are expected to be cheaply cloneable handles around
/// shared internal state (an `Arc<Mutex<..>>` or similar), matching how
/// the teacher crate treats its own child-process handles.
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Starts connecting and authenticating. Does not block until login
    /// completes; poll [`BotClient::logged_in`].
    async fn start(&self);

    /// Tears down the connection. Must be idempotent.
    async fn exit(&self);

    fn connected(&self) -> bool;
    fn logged_in(&self) -> bool;

    /// The character name selected on login, once available.
    fn character_name(&self) -> Option<String>;

    /// Performs privileged in-game setup: level, items, quest
    /// prerequisites, teleport, equipment. Implementations talk to the
    /// admin channel or an in-game GM command interface; the
    /// orchestrator only supplies the recipe.
    async fn apply_harness_setup(&self, setup: &HarnessSetup) -> Result<(), String>;

    /// Loads a route file and returns a fresh executor for it, without
    /// starting it. The split exists so callers can subscribe to the
    /// executor's events before any are emitted (spec §4.3 step 10).
    async fn load_route(&self, path: &Utf8Path) -> Result<TaskExecutor, RouteLoadError>;

    /// Parses an already-loaded [`TaskRoute`] into a fresh executor.
    fn load_parsed_route(&self, route: TaskRoute) -> TaskExecutor;

    /// Logs the client out, leaving the account provisioned for a
    /// later login (used by the snapshot save/restore cycle).
    async fn log_out(&self);

    /// Logs a previously logged-out client back in.
    async fn log_in(&self);

    /// Releases all resources. Idempotent.
    async fn dispose(&self);

    /// Kicks off or polls an in-flight [`TaskAction`]. Called once to
    /// start the action and then repeatedly (non-blocking) until it
    /// returns something other than `Running`.
    async fn drive_task_action(&self, action: &TaskAction) -> TaskActionProgress;

    /// The bot's current level, for `AssertLevel` and harness setup.
    fn level(&self) -> u32;

    /// Whether a quest id is currently in the character's quest log.
    fn has_quest_in_log(&self, quest_id: u32) -> bool;

    /// Whether the character holds at least `count` of `entry`.
    fn has_item(&self, entry: u32, count: u32) -> bool;
}

/// Creates [`BotClient`]s for a test run (spec §4.3 step 3).
///
/// A real implementation provisions the account via the admin channel
/// using a fixed test password, idempotently, before returning the
/// handle; the orchestrator only supplies the account name, class, and
/// race.
#[async_trait]
pub trait BotClientFactory: Send + Sync {
    async fn create(
        &self,
        account_name: &str,
        class: &str,
        race: &str,
    ) -> std::sync::Arc<dyn BotClient>;
}
