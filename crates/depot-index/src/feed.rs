//! # Change Feed
//!
//! The change-stream surface stores subscribe to after their initial load.
//! A subscription is a bounded channel of [`RawChange`] frames; the channel
//! closing is the disconnect signal that drives the reconnection state
//! machine. Implementations: [`WsChangeFeed`](crate::ws) for production,
//! [`MemoryFeed`] for tests and local simulation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use depot_core::RawChange;

use crate::error::{IndexError, IndexResult};

/// Frames buffered per subscription before backpressure.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Source of row-change events for one table.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a change stream scoped to a tenant and table.
    async fn subscribe(&self, tenant: &str, table: &str) -> IndexResult<FeedSubscription>;
}

/// A live change stream.
///
/// `next` yields frames until the stream disconnects, then returns `None`.
/// Dropping the subscription closes it.
pub struct FeedSubscription {
    rx: mpsc::Receiver<RawChange>,
}

impl FeedSubscription {
    pub fn new(rx: mpsc::Receiver<RawChange>) -> Self {
        FeedSubscription { rx }
    }

    /// Waits for the next change frame. `None` means the stream is gone.
    pub async fn next(&mut self) -> Option<RawChange> {
        self.rx.recv().await
    }

    /// Discards everything currently buffered. Returns how many frames went.
    ///
    /// Used after a reconciliation commit: frames that raced the fresh load
    /// are already reflected in it.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }
}

// =============================================================================
// Memory Feed
// =============================================================================

/// In-memory feed for tests and the simulation binary.
///
/// A table can hold any number of live subscriptions (two item modules watch
/// the same table in production); `emit` fans each frame out to all of them.
/// Disconnects and subscribe failures can be scripted.
#[derive(Default)]
pub struct MemoryFeed {
    senders: Mutex<HashMap<String, Vec<mpsc::Sender<RawChange>>>>,
    subscribe_counts: Mutex<HashMap<String, u32>>,
    fail_subscribes: AtomicU32,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a change frame to every live subscription on the table.
    /// Returns false if nothing received it.
    pub fn emit(&self, table: &str, change: RawChange) -> bool {
        let mut senders = self.senders.lock().expect("feed senders lock poisoned");
        let Some(subs) = senders.get_mut(table) else {
            return false;
        };
        subs.retain(|tx| !tx.is_closed());
        let mut delivered = false;
        for tx in subs.iter() {
            if tx.try_send(change.clone()).is_ok() {
                delivered = true;
            }
        }
        delivered
    }

    /// Severs every live subscription on the table, as a dropped socket
    /// would.
    pub fn disconnect(&self, table: &str) {
        self.senders
            .lock()
            .expect("feed senders lock poisoned")
            .remove(table);
    }

    /// Makes the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.fail_subscribes.store(n, Ordering::SeqCst);
    }

    /// Number of successful subscriptions opened for the table.
    pub fn subscribes(&self, table: &str) -> u32 {
        *self
            .subscribe_counts
            .lock()
            .expect("feed counts lock poisoned")
            .get(table)
            .unwrap_or(&0)
    }

    /// Returns true if the table currently has a live subscription.
    pub fn is_subscribed(&self, table: &str) -> bool {
        let mut senders = self.senders.lock().expect("feed senders lock poisoned");
        match senders.get_mut(table) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_closed());
                !subs.is_empty()
            }
            None => false,
        }
    }
}

#[async_trait]
impl ChangeFeed for MemoryFeed {
    async fn subscribe(&self, _tenant: &str, table: &str) -> IndexResult<FeedSubscription> {
        let remaining = self.fail_subscribes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_subscribes.store(remaining - 1, Ordering::SeqCst);
            return Err(IndexError::SubscribeFailed {
                table: table.to_string(),
                reason: "scripted failure".into(),
            });
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.senders
            .lock()
            .expect("feed senders lock poisoned")
            .entry(table.to_string())
            .or_default()
            .push(tx);
        *self
            .subscribe_counts
            .lock()
            .expect("feed counts lock poisoned")
            .entry(table.to_string())
            .or_insert(0) += 1;

        Ok(FeedSubscription::new(rx))
    }
}
