// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Services`: the explicit collaborator bundle threaded into the
//! coordinators (spec §9 redesign flags: "replace [a] mutable
//! singleton factory with ambient state... with an explicit `Services`
//! value threaded into coordinators; no module-level state").

use crate::client::BotClientFactory;
use crate::store::DynSnapshotManager;
use camino::Utf8PathBuf;
use std::sync::Arc;

/// Everything a [`crate::run::TestRunCoordinator`] needs beyond a
/// route path: where routes live on disk, how to mint bots, and
/// (optionally) where snapshots persist.
#[derive(Clone)]
pub struct Services {
    pub routes_dir: Utf8PathBuf,
    pub bot_client_factory: Arc<dyn BotClientFactory>,
    pub snapshot_manager: Option<Arc<DynSnapshotManager>>,
}

impl Services {
    pub fn new(routes_dir: impl Into<Utf8PathBuf>, bot_client_factory: Arc<dyn BotClientFactory>) -> Self {
        Self {
            routes_dir: routes_dir.into(),
            bot_client_factory,
            snapshot_manager: None,
        }
    }

    pub fn with_snapshot_manager(mut self, manager: Arc<DynSnapshotManager>) -> Self {
        self.snapshot_manager = Some(manager);
        self
    }
}
