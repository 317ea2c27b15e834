//! Wire models for the Stockly API.
//!
//! This module contains the data structures exchanged with the
//! Authentication and Image services:
//!
//! - `AuthTokens`, `CredentialPair`: Token payloads returned by login/refresh
//! - `User`, `UserUpdate`, `RegisterRequest`: Account profile types
//! - `GeneratedImage`: A prompt and the images generated for it

pub mod image;
pub mod token;
pub mod user;

pub use image::GeneratedImage;
pub use token::{AuthTokens, CredentialPair, GoogleAuthUrl};
pub use user::{RegisterRequest, User, UserUpdate};
