use parking_lot::RwLock;
use tracing::info;

use super::events::{AuthEvent, AuthEvents};

/// Path of the sign-in view.
pub const SIGN_IN_PATH: &str = "/signin";

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn navigate(&self, path: &str);

    fn is_on_sign_in(&self) -> bool {
        self.current_path().starts_with(SIGN_IN_PATH)
    }
}

/// Tracks the current path in memory and announces sign-in redirects on the
/// auth event channel.
pub struct EventNavigator {
    location: RwLock<String>,
    events: AuthEvents,
}

impl EventNavigator {
    pub fn new(initial_path: impl Into<String>, events: AuthEvents) -> Self {
        Self {
            location: RwLock::new(initial_path.into()),
            events,
        }
    }
}

impl Navigator for EventNavigator {
    fn current_path(&self) -> String {
        self.location.read().clone()
    }

    fn navigate(&self, path: &str) {
        info!(from = %self.current_path(), to = path, "Navigating");
        *self.location.write() = path.to_string();
        if path.starts_with(SIGN_IN_PATH) {
            self.events.emit(AuthEvent::SignInRequired);
        }
    }
}
