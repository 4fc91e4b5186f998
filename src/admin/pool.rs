// Copyright (c) The fleet-orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A bounded pool of [`AdminChannel`]s (spec §4.7).
//!
//! "A single channel serializes all parallel test runs; the pool
//! bounds concurrency at `maxSize`... `GetConnection` blocks on a
//! semaphore permit; on first acquisition it lazily opens a new
//! channel; released connections return to the pool; dispose closes
//! all connections."

use super::AdminChannel;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

const DEFAULT_MAX_SIZE: usize = 4;

/// A factory for admin channels, invoked lazily as the pool grows.
pub type ChannelFactory = Box<dyn Fn() -> Box<dyn AdminChannel> + Send + Sync>;

pub struct ConnectionPool {
    factory: ChannelFactory,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn AdminChannel>>>,
}

impl ConnectionPool {
    pub fn new(factory: ChannelFactory) -> Self {
        Self::with_max_size(factory, DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(factory: ChannelFactory, max_size: usize) -> Self {
        Self {
            factory,
            semaphore: Arc::new(Semaphore::new(max_size.max(1))),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Blocks on a semaphore permit, then returns either an idle
    /// connection or a freshly-opened one.
    pub async fn get_connection(&self) -> PooledConnection<'_> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore is never closed");

        let existing = self.idle.lock().expect("pool lock poisoned").pop();
        let channel = match existing {
            Some(channel) => channel,
            None => {
                let mut channel = (self.factory)();
                if !channel.connect().await {
                    // Failure to reconnect is silent: the next
                    // send_command attempt retries internally.
                    tracing::warn!("admin channel failed to connect on first acquisition");
                }
                channel
            }
        };

        PooledConnection {
            pool: self,
            channel: Some(channel),
            _permit: permit,
        }
    }

    /// Closes every idle connection. In-flight checked-out connections
    /// close themselves when returned.
    pub async fn dispose(&self) {
        let channels: Vec<_> = self.idle.lock().expect("pool lock poisoned").drain(..).collect();
        for mut channel in channels {
            channel.dispose().await;
        }
    }

    fn release(&self, channel: Box<dyn AdminChannel>) {
        self.idle.lock().expect("pool lock poisoned").push(channel);
    }
}

/// A checked-out admin channel. Returned to the pool's idle list when
/// dropped.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    channel: Option<Box<dyn AdminChannel>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl<'a> PooledConnection<'a> {
    pub async fn send_command(&mut self, command: &str) -> Result<String, String> {
        let channel = self.channel.as_mut().expect("channel taken before use");
        channel.send_command(command).await
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.pool.release(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        id: usize,
    }

    #[async_trait]
    impl AdminChannel for CountingChannel {
        async fn connect(&mut self) -> bool {
            true
        }
        async fn send_command(&mut self, command: &str) -> Result<String, String> {
            Ok(format!("channel-{}: {command}", self.id))
        }
        async fn dispose(&mut self) {}
    }

    #[tokio::test]
    async fn bounds_concurrency_and_reuses_idle_connections() {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory_counter = counter.clone();
        let pool = ConnectionPool::with_max_size(
            Box::new(move || {
                let id = factory_counter.fetch_add(1, Ordering::SeqCst);
                Box::new(CountingChannel { id }) as Box<dyn AdminChannel>
            }),
            2,
        );

        let mut a = pool.get_connection().await;
        let mut b = pool.get_connection().await;
        assert_eq!(a.send_command("ping").await.unwrap(), "channel-0: ping");
        assert_eq!(b.send_command("ping").await.unwrap(), "channel-1: ping");
        drop(a);
        drop(b);

        // Reuses the two idle connections rather than opening new ones.
        let mut c = pool.get_connection().await;
        let reply = c.send_command("ping").await.unwrap();
        assert!(reply.starts_with("channel-0") || reply.starts_with("channel-1"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
