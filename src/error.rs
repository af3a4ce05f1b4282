//! Engine-level errors.
//!
//! Query-time failures never surface here; they are carried as
//! [`IndexError`] inside query outcomes. These errors describe why the
//! engine is not usable at all.

use search_algolia_core::index::IndexError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Application id or API key is missing.
    #[error("search engine is not configured: application id and API key are required")]
    NotConfigured,

    /// The hosted service rejected the credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(IndexError),

    /// The API key lacks grants the engine needs.
    #[error("API key is missing required ACLs: {}", .0.join(", "))]
    MissingAcls(Vec<String>),

    #[error("index setup failed: {0}")]
    IndexSetup(IndexError),

    /// The HTTP client could not be built.
    #[error("client error: {0}")]
    Client(String),
}
