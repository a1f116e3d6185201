// SPDX-License-Identifier: MIT

//! Application error types shared by every component.

/// Application error type surfaced by the synchronization core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("Catalog API error: {0}")]
    CatalogApi(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this error is a superseded in-flight fetch.
    ///
    /// Callers discard these instead of surfacing them to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
