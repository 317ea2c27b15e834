//! API client for communicating with the Stockly REST API.
//!
//! This module provides the `ApiClient` struct. Every request it makes goes
//! through the [`SessionGuard`], so callers never handle bearer tokens or
//! token expiry themselves.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::SessionContext;

use super::auth::AuthApi;
use super::guard::SessionGuard;
use super::images::ImagesApi;
use super::request::OutboundRequest;
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default API host when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Prefix the service mounts every router under.
const API_PREFIX: &str = "api/";

/// HTTP request timeout in seconds.
/// Image generation is slow; 120s leaves room for it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// API client for Stockly.
/// Clone is cheap - every clone shares the guard and its connection pool.
#[derive(Clone)]
pub struct ApiClient {
    guard: Arc<SessionGuard>,
}

impl ApiClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Client for the default local host with an in-memory session.
    pub fn localhost() -> Result<Self, ApiError> {
        Self::builder().base_url(DEFAULT_BASE_URL).build()
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    pub fn images(&self) -> ImagesApi {
        ImagesApi::new(self.clone())
    }

    pub fn session(&self) -> &SessionContext {
        self.guard.session()
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    /// Resolved URL for an API path.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.guard.url(path)
    }

    // ===== Internal HTTP methods =====

    pub(crate) async fn send(&self, request: &OutboundRequest) -> Result<Response, ApiError> {
        self.guard.execute(request).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: &OutboundRequest,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        SessionGuard::parse_json(response, &request.path).await
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(&OutboundRequest::get(path)).await
    }

    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        self.send_json(&OutboundRequest::post(path).json(body)).await
    }

    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        self.send_json(&OutboundRequest::put(path).json(body)).await
    }

    /// DELETE; the response body is ignored.
    pub(crate) async fn delete(&self, request: OutboundRequest) -> Result<(), ApiError> {
        self.send(&request).await?;
        Ok(())
    }
}

/// Builder for creating an `ApiClient`.
pub struct ClientBuilder {
    base_url: Option<String>,
    session: Option<SessionContext>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            session: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: None,
        }
    }

    /// Service host, e.g. `http://localhost:8000`. Required.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Session the client reads and writes tokens through. Defaults to an
    /// in-memory session.
    pub fn session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::Config("base_url is required".to_string()))?;

        let mut api_root = Url::parse(&base_url)?;
        if api_root.cannot_be_a_base() {
            return Err(ApiError::Config(format!("base_url cannot be a base: {}", base_url)));
        }
        if !api_root.path().ends_with('/') {
            let path = format!("{}/", api_root.path());
            api_root.set_path(&path);
        }
        let api_root = api_root.join(API_PREFIX)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("stockly-core/{}", env!("CARGO_PKG_VERSION")));

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        let session = self.session.unwrap_or_else(SessionContext::in_memory);

        Ok(ApiClient {
            guard: Arc::new(SessionGuard::new(http, api_root, self.timeout, session)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
