// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `StateStore` collaborator contract and `SnapshotManager` (spec
//! §4.6).

use crate::client::Position;
use async_trait::async_trait;
use tokio::sync::OnceCell;

/// A named, persisted capture of a character's scalar state and
/// completed quests (spec §4.6, §3 glossary).
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub character_guid: u64,
    pub level: u32,
    pub xp: u64,
    pub money: u64,
    pub position: Position,
    pub completed_quest_ids: Vec<u32>,
}

/// A transactional store for prerequisite quest state and named
/// character snapshots (spec §4.6, §6).
///
/// Implementations own the relational database; the orchestrator only
/// ever calls through this trait.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Creates the backing tables if they do not already exist. Must
    /// be idempotent; [`SnapshotManager`] additionally guards this with
    /// a once-token so concurrent first use from parallel suite
    /// entries does not race (spec §9 redesign flags).
    async fn ensure_schema(&self) -> Result<(), String>;

    async fn snapshot_exists(&self, name: &str) -> Result<bool, String>;

    /// Captures `character_name`'s current state under `name`. Must be
    /// atomic with respect to other save/delete of the same name.
    async fn save_snapshot(&self, name: &str, character_name: &str) -> Result<(), String>;

    /// Applies a previously saved snapshot to `character_name`.
    async fn restore_snapshot(&self, name: &str, character_name: &str) -> Result<(), String>;

    /// Deletes a snapshot and its associated quest rows, if present.
    async fn delete_snapshot(&self, name: &str) -> Result<(), String>;

    /// Upserts prerequisite quest completion rows for a character.
    /// Calling this again with the same `quest_ids` is a no-op on row
    /// count (spec §8 idempotence).
    async fn mark_quests_completed(
        &self,
        character_name: &str,
        quest_ids: &[u32],
    ) -> Result<(), String>;

    /// Whether `restore_snapshot` requires the target character to be
    /// offline (spec §9 open question). Defaults to `false`; the
    /// coordinator performs a logout/restore/login cycle only when
    /// this returns `true`.
    fn requires_offline_for_restore(&self) -> bool {
        false
    }
}

/// A thin, idempotent wrapper over [`StateStore`] (spec §4.6).
pub struct SnapshotManager<S> {
    store: S,
    schema_ready: OnceCell<()>,
}

impl<S: StateStore> SnapshotManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            schema_ready: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn ensure_ready(&self) -> Result<(), String> {
        self.schema_ready
            .get_or_try_init(|| self.store.ensure_schema())
            .await
            .map(|_| ())
    }

    pub async fn exists(&self, name: &str) -> Result<bool, String> {
        self.ensure_ready().await?;
        self.store.snapshot_exists(name).await
    }

    /// Last-writer-wins: deletes any prior snapshot of the same name
    /// before saving (spec §3, §4.6).
    pub async fn save(&self, name: &str, character_name: &str) -> Result<(), String> {
        self.ensure_ready().await?;
        self.store.delete_snapshot(name).await?;
        self.store.save_snapshot(name, character_name).await
    }

    pub async fn restore(&self, name: &str, character_name: &str) -> Result<(), String> {
        self.ensure_ready().await?;
        self.store.restore_snapshot(name, character_name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), String> {
        self.ensure_ready().await?;
        self.store.delete_snapshot(name).await
    }

    pub async fn mark_quests_completed(
        &self,
        character_name: &str,
        quest_ids: &[u32],
    ) -> Result<(), String> {
        self.ensure_ready().await?;
        self.store
            .mark_quests_completed(character_name, quest_ids)
            .await
    }
}

#[async_trait]
impl StateStore for std::sync::Arc<dyn StateStore> {
    async fn ensure_schema(&self) -> Result<(), String> {
        (**self).ensure_schema().await
    }
    async fn snapshot_exists(&self, name: &str) -> Result<bool, String> {
        (**self).snapshot_exists(name).await
    }
    async fn save_snapshot(&self, name: &str, character_name: &str) -> Result<(), String> {
        (**self).save_snapshot(name, character_name).await
    }
    async fn restore_snapshot(&self, name: &str, character_name: &str) -> Result<(), String> {
        (**self).restore_snapshot(name, character_name).await
    }
    async fn delete_snapshot(&self, name: &str) -> Result<(), String> {
        (**self).delete_snapshot(name).await
    }
    async fn mark_quests_completed(
        &self,
        character_name: &str,
        quest_ids: &[u32],
    ) -> Result<(), String> {
        (**self).mark_quests_completed(character_name, quest_ids).await
    }
    fn requires_offline_for_restore(&self) -> bool {
        (**self).requires_offline_for_restore()
    }
}

/// A [`SnapshotManager`] over a type-erased store, the shape
/// [`crate::run::Services`] actually holds.
pub type DynSnapshotManager = SnapshotManager<std::sync::Arc<dyn StateStore>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        schema_inits: Mutex<u32>,
        snapshots: Mutex<std::collections::BTreeMap<String, String>>,
        quests: Mutex<std::collections::BTreeMap<String, std::collections::BTreeSet<u32>>>,
    }

    #[async_trait]
    impl StateStore for InMemoryStore {
        async fn ensure_schema(&self) -> Result<(), String> {
            *self.schema_inits.lock().unwrap() += 1;
            Ok(())
        }
        async fn snapshot_exists(&self, name: &str) -> Result<bool, String> {
            Ok(self.snapshots.lock().unwrap().contains_key(name))
        }
        async fn save_snapshot(&self, name: &str, character_name: &str) -> Result<(), String> {
            self.snapshots
                .lock()
                .unwrap()
                .insert(name.to_string(), character_name.to_string());
            Ok(())
        }
        async fn restore_snapshot(&self, name: &str, _character_name: &str) -> Result<(), String> {
            if self.snapshots.lock().unwrap().contains_key(name) {
                Ok(())
            } else {
                Err(format!("no snapshot named {name}"))
            }
        }
        async fn delete_snapshot(&self, name: &str) -> Result<(), String> {
            self.snapshots.lock().unwrap().remove(name);
            Ok(())
        }
        async fn mark_quests_completed(
            &self,
            character_name: &str,
            quest_ids: &[u32],
        ) -> Result<(), String> {
            self.quests
                .lock()
                .unwrap()
                .entry(character_name.to_string())
                .or_default()
                .extend(quest_ids.iter().copied());
            Ok(())
        }
    }

    #[tokio::test]
    async fn schema_is_initialized_exactly_once() {
        let manager = SnapshotManager::new(InMemoryStore::default());
        manager.exists("a").await.unwrap();
        manager.exists("b").await.unwrap();
        manager.save("c", "Hero").await.unwrap();
        assert_eq!(*manager.store().schema_inits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn save_is_last_writer_wins() {
        let manager = SnapshotManager::new(InMemoryStore::default());
        manager.save("n", "Hero").await.unwrap();
        manager.save("n", "Other").await.unwrap();
        assert_eq!(
            manager.store().snapshots.lock().unwrap().get("n"),
            Some(&"Other".to_string())
        );
    }

    #[tokio::test]
    async fn marking_the_same_quests_twice_is_a_no_op_on_row_count() {
        let manager = SnapshotManager::new(InMemoryStore::default());
        manager.mark_quests_completed("Hero", &[1, 2, 3]).await.unwrap();
        manager.mark_quests_completed("Hero", &[1, 2, 3]).await.unwrap();
        assert_eq!(
            manager
                .store()
                .quests
                .lock()
                .unwrap()
                .get("Hero")
                .unwrap()
                .len(),
            3
        );
    }
}
