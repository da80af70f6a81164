//! # Depot Index
//!
//! Indexation and realtime cache synchronization engine for the Depot
//! inventory portal.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          depot-index                                    │
//! │                                                                         │
//! │  ┌──────────┐   sign-in    ┌─────────────────────────────────────────┐ │
//! │  │ session  │ ───────────► │            IndexStore (per module)      │ │
//! │  └──────────┘              │                                         │ │
//! │                            │  boot:   cache probe ──► batch load     │ │
//! │  ┌──────────┐   pages      │  live:   change stream ──► snapshot     │ │
//! │  │ backend  │ ───────────► │  outage: backoff ──► reconcile          │ │
//! │  │ (http)   │              │                                         │ │
//! │  └──────────┘              └──────────────┬──────────────────────────┘ │
//! │                                           │                            │
//! │  ┌──────────┐   frames                    │ snapshots + status         │
//! │  │   feed   │ ──────────────────────────► │                            │
//! │  │   (ws)   │                             ▼                            │
//! │  └──────────┘              ┌─────────────────────────────────────────┐ │
//! │                            │  aggregator ──► consolidated status     │ │
//! │  ┌──────────┐   entries    └─────────────────────────────────────────┘ │
//! │  │  cache   │ ◄── snapshots persisted per tenant, 7-day freshness      │
//! │  └──────────┘                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//! - [`engine::Engine`]: wires session, stores, and aggregator together
//! - [`store::IndexStore`]: one task per module owning its snapshot
//! - [`loader::BatchLoader`]: count-then-pages full loads with progress
//! - [`feed`] / [`ws`]: change-stream subscriptions
//! - [`backend`] / [`http`]: row queries for batch loads
//! - [`reconnect`]: backoff schedule with a hard attempt cap
//! - [`aggregator`]: polls stores into one status feed

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod loader;
pub mod reconnect;
pub mod session;
pub mod store;
pub mod ws;

pub use aggregator::{AggregatorHandle, StatusAggregator, StatusSource};
pub use backend::{MemoryBackend, RecordBackend};
pub use config::IndexConfig;
pub use engine::Engine;
pub use error::{IndexError, IndexResult};
pub use feed::{ChangeFeed, FeedSubscription, MemoryFeed};
pub use http::HttpBackend;
pub use loader::BatchLoader;
pub use reconnect::{ReconnectPolicy, ReconnectSchedule};
pub use session::{SessionBroadcaster, SessionState, SessionWatch};
pub use store::{IndexContext, IndexHandle, IndexStore};
pub use ws::WsChangeFeed;
