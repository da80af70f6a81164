//! # Session State
//!
//! Publishes the signed-in tenant to every index store over a watch channel.
//!
//! ## Auth Gate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Session Lifecycle                               │
//! │                                                                         │
//! │   SessionBroadcaster ──watch──▶ IndexStore (one receiver per store)    │
//! │                                                                         │
//! │   SignedOut:       stores hold position, no cache or network traffic   │
//! │   Authenticated:   stores boot (cache probe, batch load, subscribe)    │
//! │   sign_out():      stores tear down and wait for the next sign-in      │
//! │                                                                         │
//! │   Tenant switches are a sign-out followed by a sign-in; stores never   │
//! │   serve one tenant's rows under another tenant's key.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::watch;
use tracing::info;

/// Receiver half handed to index stores.
pub type SessionWatch = watch::Receiver<SessionState>;

/// The authentication state visible to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session. Stores stay dormant.
    #[default]
    SignedOut,

    /// A tenant session is live.
    Authenticated {
        /// Tenant identifier, scopes every cache key and query.
        tenant_id: String,
    },
}

impl SessionState {
    /// Returns the tenant if a session is live.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            SessionState::SignedOut => None,
            SessionState::Authenticated { tenant_id } => Some(tenant_id),
        }
    }

    /// Returns true if a session is live.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// Owner side of the session channel.
///
/// The host application calls `sign_in` / `sign_out` as its auth layer
/// resolves; stores react through their `SessionWatch` receivers.
#[derive(Debug, Clone)]
pub struct SessionBroadcaster {
    tx: watch::Sender<SessionState>,
}

impl SessionBroadcaster {
    /// Creates a broadcaster starting signed out.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::SignedOut);
        SessionBroadcaster { tx }
    }

    /// Publishes a live session for the given tenant.
    ///
    /// `send_replace` so the state lands even before any store subscribes.
    pub fn sign_in(&self, tenant_id: impl Into<String>) {
        let tenant_id = tenant_id.into();
        info!(tenant = %tenant_id, "Session signed in");
        self.tx.send_replace(SessionState::Authenticated { tenant_id });
    }

    /// Publishes sign-out. Stores tear down on observing it.
    pub fn sign_out(&self) {
        info!("Session signed out");
        self.tx.send_replace(SessionState::SignedOut);
    }

    /// Returns a receiver seeded with the current state.
    pub fn subscribe(&self) -> SessionWatch {
        self.tx.subscribe()
    }

    /// Returns the current state.
    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }
}

impl Default for SessionBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
