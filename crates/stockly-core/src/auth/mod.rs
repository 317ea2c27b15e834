//! Authentication state for the Stockly client.
//!
//! This module provides:
//! - `CredentialStore`: Persisted access/refresh token storage, backed by the
//!   OS keychain (`KeyringCredentialStore`), a cache file
//!   (`FileCredentialStore`), or memory
//! - `AuthEvents`: Broadcast of login/logout/profile changes
//! - `Navigator`: The current view and the sign-in redirect
//! - `SessionContext`: The bundle of the above handed to the API client

pub mod credentials;
pub mod events;
pub mod navigator;
pub mod session;

use std::sync::Arc;

pub use credentials::{CredentialStore, KeyringCredentialStore, MemoryCredentialStore, TokenKind};
pub use events::{AuthEvent, AuthEvents};
pub use navigator::{EventNavigator, Navigator, SIGN_IN_PATH};
pub use session::{FileCredentialStore, SessionData};

/// Everything the session guard needs, passed explicitly at client
/// construction.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn CredentialStore>,
    pub events: AuthEvents,
    pub navigator: Arc<dyn Navigator>,
}

impl SessionContext {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        events: AuthEvents,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            store,
            events,
            navigator,
        }
    }

    /// Context with a fresh event channel and an `EventNavigator` at `/`.
    pub fn with_store(store: Arc<dyn CredentialStore>) -> Self {
        let events = AuthEvents::new();
        let navigator = Arc::new(EventNavigator::new("/", events.clone()));
        Self::new(store, events, navigator)
    }

    /// Memory-only context.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryCredentialStore::new()))
    }
}
