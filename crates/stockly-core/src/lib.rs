//! Stockly client core.
//!
//! Typed access to the Stockly Authentication and Image services, with the
//! session lifecycle handled for the caller: tokens are persisted in a
//! [`CredentialStore`](auth::CredentialStore), attached to every request, and
//! refreshed once when the service answers 401.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockly_core::api::ApiClient;
//! use stockly_core::auth::{MemoryCredentialStore, SessionContext};
//!
//! # async fn example() -> Result<(), stockly_core::api::ApiError> {
//! let session = SessionContext::with_store(Arc::new(MemoryCredentialStore::new()));
//! let client = ApiClient::builder()
//!     .base_url("http://localhost:8000")
//!     .session(session)
//!     .build()?;
//!
//! client.auth().login("ada@example.com", "hunter2").await?;
//! let image = client.images().generate("a lighthouse at dusk", None).await?;
//! println!("{}", image.image_urls.join("\n"));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::SessionContext;
pub use config::Config;
