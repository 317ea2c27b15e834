//! Auth-state broadcast.
//!
//! Views that display identity (navigation bar, profile header) subscribe
//! here instead of polling the credential store.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::User;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Auth-state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// Tokens were stored after login or OAuth callback.
    Login,
    /// Tokens were cleared by an explicit logout.
    Logout,
    /// The profile was updated.
    UserUpdated(User),
    /// The session could not be recovered; the user must sign in again.
    SignInRequired,
}

impl AuthEvent {
    /// Event name used by the web client's channel.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::Login => "auth-login",
            AuthEvent::Logout => "auth-logout",
            AuthEvent::UserUpdated(_) => "user-updated",
            AuthEvent::SignInRequired => "sign-in-required",
        }
    }
}

/// Cheap to clone; every clone feeds the same channel.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: AuthEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "Auth event emitted"),
            Err(_) => debug!(event = name, "Auth event dropped, no subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}
