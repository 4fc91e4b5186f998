// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `AdminChannel` collaborator contract and its connection pool
//! (spec §4.7, §6).

mod pool;

pub use pool::ConnectionPool;

use async_trait::async_trait;

/// A privileged, blocking, line-oriented control channel to the game
/// server (spec §6). The orchestrator never constructs the command
/// strings it sends — those come from `BotClient` / its factory.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    async fn connect(&mut self) -> bool;
    async fn send_command(&mut self, command: &str) -> Result<String, String>;
    async fn dispose(&mut self);
}
