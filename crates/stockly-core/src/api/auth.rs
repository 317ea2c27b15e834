//! Authentication service endpoints.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::AuthEvent;
use crate::models::{AuthTokens, GoogleAuthUrl, RegisterRequest, User, UserUpdate};

use super::request::OutboundRequest;
use super::{ApiClient, ApiError};

/// Login, registration, OAuth, and profile calls.
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Log in with email and password. The returned pair is stored and
    /// `auth-login` is broadcast.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, ApiError> {
        let tokens: AuthTokens = self
            .client
            .post("auth/login", json!({ "email": email, "password": password }))
            .await?;
        self.start_session(&tokens)?;
        info!(email, "Logged in");
        Ok(tokens)
    }

    /// Create an account. No tokens are issued; log in afterwards.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let user: User = self.client.post("auth/register", body).await?;
        info!(email = %user.email, "Registered account");
        Ok(user)
    }

    /// Exchange a refresh token for a new pair without touching the store.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        self.client.guard().refresh(refresh_token).await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.client.get("auth/me").await
    }

    /// Public profile of another account.
    pub async fn user_by_id(&self, user_id: &str) -> Result<User, ApiError> {
        let request = OutboundRequest::get("auth/user").segment(user_id);
        self.client.send_json(&request).await
    }

    /// Update the signed-in profile and broadcast `user-updated`.
    pub async fn update_me(&self, update: &UserUpdate) -> Result<User, ApiError> {
        if update.is_empty() {
            return Err(ApiError::InvalidRequest("no profile fields to update".to_string()));
        }
        let body = serde_json::to_value(update)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let user: User = self.client.put("auth/me", body).await?;
        self.client
            .session()
            .events
            .emit(AuthEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    /// Google consent screen URL to send the user to.
    pub async fn google_auth_url(&self) -> Result<GoogleAuthUrl, ApiError> {
        self.client.get("auth/google/url").await
    }

    /// Finish Google sign-in with the authorization code from the redirect.
    pub async fn google_callback(&self, code: &str) -> Result<AuthTokens, ApiError> {
        if code.trim().is_empty() {
            return Err(ApiError::InvalidRequest("authorization code is empty".to_string()));
        }
        let tokens: AuthTokens = self
            .client
            .post("auth/google/callback", json!({ "code": code }))
            .await?;
        self.start_session(&tokens)?;
        info!("Logged in with Google");
        Ok(tokens)
    }

    /// Check a stored session against the service. Stale credentials are
    /// cleared and `None` is returned.
    pub async fn validate_session(&self) -> Result<Option<User>, ApiError> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        match self.me().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid");
                self.client
                    .session()
                    .store
                    .clear()
                    .map_err(ApiError::Storage)?;
                Ok(None)
            }
        }
    }

    /// Whether an access token is stored. Says nothing about its validity.
    pub fn is_authenticated(&self) -> bool {
        match self.client.session().store.access_token() {
            Ok(token) => token.is_some_and(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, "Could not read access token");
                false
            }
        }
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.client.guard().logout()
    }

    fn start_session(&self, tokens: &AuthTokens) -> Result<(), ApiError> {
        let session = self.client.session();
        session
            .store
            .store_pair(&tokens.credential_pair())
            .map_err(ApiError::Storage)?;
        session.events.emit(AuthEvent::Login);
        Ok(())
    }
}
