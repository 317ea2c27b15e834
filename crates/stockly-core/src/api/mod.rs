//! REST API client module for the Stockly services.
//!
//! This module provides the `ApiClient` for the Authentication and Image
//! services. Calls are authorized with bearer tokens from the session's
//! credential store; expired access tokens are refreshed transparently by the
//! `SessionGuard`.

pub mod auth;
pub mod client;
pub mod error;
pub mod guard;
pub mod images;
pub mod request;

pub use auth::AuthApi;
pub use client::{ApiClient, ClientBuilder, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
pub use guard::{Dispatch, SessionGuard};
pub use images::{ImagesApi, DEFAULT_HISTORY_LIMIT};
pub use request::{OutboundRequest, RequestBody, RequestContext};
