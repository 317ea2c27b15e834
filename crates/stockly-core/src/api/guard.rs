//! Session guard: bearer attachment and one-shot refresh-and-retry.
//!
//! Every call goes through [`SessionGuard::execute`]:
//!
//! 1. the current access token, if any, is attached as a bearer header;
//! 2. a 401 on a first, non-exempt attempt hands over to
//!    [`SessionGuard::handle_failure`], which refreshes the token pair;
//! 3. on success the request is re-dispatched exactly once with the new token.
//!
//! Unrecoverable failures clear the credential store and send the user to the
//! sign-in view. Refreshes are single-flight: requests that fail together wait
//! for one refresh and then share its outcome, retrying on success and
//! returning the same refresh error on failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthEvent, SessionContext, TokenKind, SIGN_IN_PATH};
use crate::models::AuthTokens;

use super::request::{OutboundRequest, RequestBody, RequestContext};
use super::ApiError;

/// Path of the token refresh endpoint, relative to the API root.
pub const REFRESH_PATH: &str = "auth/refresh";

/// What the failed attempt was sent with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Access token attached to the attempt, if any.
    pub access_token: Option<String>,
    /// Recovery generation observed before the attempt went out.
    pub generation: u64,
}

/// Result of the most recent recovery, kept for requests that waited on it.
#[derive(Debug, Clone)]
enum Recovery {
    Refreshed,
    Failed(Arc<ApiError>),
    SignedOut,
}

pub struct SessionGuard {
    http: Client,
    api_root: Url,
    timeout: Duration,
    session: SessionContext,
    /// Bumped under `recovery` each time a recovery settles.
    generation: AtomicU64,
    recovery: Mutex<Option<Recovery>>,
}

impl SessionGuard {
    pub(crate) fn new(http: Client, api_root: Url, timeout: Duration, session: SessionContext) -> Self {
        Self {
            http,
            api_root,
            timeout,
            session,
            generation: AtomicU64::new(0),
            recovery: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Build a URL for an API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.api_root.join(path.trim_start_matches('/'))?)
    }

    /// Build the full URL for a request, encoding each identifier segment.
    pub(crate) fn request_url(&self, request: &OutboundRequest) -> Result<Url, ApiError> {
        let mut url = self.url(&request.path)?;
        if request.segments.is_empty() {
            return Ok(url);
        }
        if let Some(bad) = request
            .segments
            .iter()
            .find(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(ApiError::InvalidRequest(format!("Invalid path identifier: {:?}", bad)));
        }
        url.path_segments_mut()
            .map_err(|_| ApiError::Config("API root cannot take path segments".into()))?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }

    /// Set the bearer header from the stored access token. Returns the token
    /// that was attached. A missing token is not an error; the request goes
    /// out unauthenticated.
    pub fn attach(&self, builder: RequestBuilder) -> (RequestBuilder, Option<String>) {
        match self.stored(TokenKind::Access) {
            Some(token) => (builder.bearer_auth(&token), Some(token)),
            None => (builder, None),
        }
    }

    /// Dispatch a request with refresh-on-401.
    pub async fn execute(&self, request: &OutboundRequest) -> Result<Response, ApiError> {
        self.execute_with(request, RequestContext::new()).await
    }

    /// Dispatch with an explicit context, e.g. [`RequestContext::exempt`].
    pub async fn execute_with(
        &self,
        request: &OutboundRequest,
        ctx: RequestContext,
    ) -> Result<Response, ApiError> {
        let (response, sent) = self.send_attached(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !ctx.may_refresh() {
            return Self::check_response(response).await;
        }

        debug!(method = %request.method, path = %request.path, "Unauthorized, attempting recovery");
        let original = Self::error_from(response).await;
        let retry_ctx = self.handle_failure(ctx, &sent, original).await?;

        debug!(
            method = %request.method,
            path = %request.path,
            retries = retry_ctx.retries,
            "Retrying with refreshed token"
        );
        let (response, _) = self.send_attached(request).await?;
        Self::check_response(response).await
    }

    /// Recover from a 401 on `ctx`'s attempt.
    ///
    /// `sent` describes the failed attempt. Returns the context for the single
    /// retry, or the error to hand to the caller: the original error when
    /// there is no refresh token, the refresh error when the refresh call
    /// fails or its result cannot be stored.
    ///
    /// A request that waited on another request's recovery takes that outcome
    /// instead of starting its own, so the sign-in redirect happens once.
    pub async fn handle_failure(
        &self,
        ctx: RequestContext,
        sent: &Dispatch,
        original: ApiError,
    ) -> Result<RequestContext, ApiError> {
        if !ctx.may_refresh() {
            return Err(original);
        }

        let mut last = self.recovery.lock().await;

        if self.generation.load(Ordering::Acquire) != sent.generation {
            return match last.as_ref() {
                Some(Recovery::Refreshed) => {
                    debug!("Token pair already refreshed by a concurrent request");
                    Ok(ctx.retried())
                }
                Some(Recovery::Failed(e)) => Err(ApiError::RefreshFailed(Arc::clone(e))),
                Some(Recovery::SignedOut) | None => Err(original),
            };
        }

        // The pair may also have been replaced outside a refresh, e.g. by a login.
        let current = self.stored(TokenKind::Access);
        if current.is_some() && current != sent.access_token {
            debug!("Access token changed since the request was sent");
            return Ok(ctx.retried());
        }

        let Some(refresh_token) = self.stored(TokenKind::Refresh) else {
            warn!("No refresh token available, sign-in required");
            self.clear_credentials();
            self.session.navigator.navigate(SIGN_IN_PATH);
            self.settle(&mut last, Recovery::SignedOut);
            return Err(original);
        };

        let stored = match self.refresh(&refresh_token).await {
            Ok(tokens) => self
                .session
                .store
                .store_pair(&tokens.credential_pair())
                .map_err(ApiError::Storage),
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => {
                info!("Access token refreshed");
                self.settle(&mut last, Recovery::Refreshed);
                Ok(ctx.retried())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.clear_credentials();
                if !self.session.navigator.is_on_sign_in() {
                    self.session.navigator.navigate(SIGN_IN_PATH);
                }
                let e = Arc::new(e);
                self.settle(&mut last, Recovery::Failed(Arc::clone(&e)));
                Err(ApiError::RefreshFailed(e))
            }
        }
    }

    fn settle(&self, last: &mut Option<Recovery>, outcome: Recovery) {
        *last = Some(outcome);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Exchange a refresh token for a new pair. This call is never intercepted
    /// and carries no bearer header.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let request = OutboundRequest::post(REFRESH_PATH)
            .json(serde_json::json!({ "refresh_token": refresh_token }));
        let response = Self::send(&request, self.build(&request)?, false).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, REFRESH_PATH).await
    }

    /// Clear the credential store. No network I/O.
    pub fn logout(&self) -> Result<(), ApiError> {
        let result = self.session.store.clear();
        info!("Logged out");
        self.session.events.emit(AuthEvent::Logout);
        result.map_err(ApiError::Storage)
    }

    async fn send_attached(
        &self,
        request: &OutboundRequest,
    ) -> Result<(Response, Dispatch), ApiError> {
        let generation = self.generation.load(Ordering::Acquire);
        let (builder, access_token) = self.attach(self.build(request)?);
        let response = Self::send(request, builder, access_token.is_some()).await?;
        Ok((response, Dispatch { access_token, generation }))
    }

    fn build(&self, request: &OutboundRequest) -> Result<RequestBuilder, ApiError> {
        let url = self.request_url(request)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .timeout(self.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        Ok(match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(fields) => builder.multipart(OutboundRequest::multipart_form(fields)),
        })
    }

    async fn send(
        request: &OutboundRequest,
        builder: RequestBuilder,
        authenticated: bool,
    ) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status().as_u16(),
            authenticated,
            "Request completed"
        );
        Ok(response)
    }

    /// Check if response is successful, returning an error with body if not.
    pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::from_status(status, &body)
    }

    pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
        response: Response,
        path: &str,
    ) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    fn stored(&self, kind: TokenKind) -> Option<String> {
        match self.session.store.get(kind) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(token = kind.key(), error = %e, "Failed to read credential store");
                None
            }
        }
    }

    fn clear_credentials(&self) {
        if let Err(e) = self.session.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
    }
}
