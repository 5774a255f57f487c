//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`CheckpointError`], [`ConfigError`]) for detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! Observers of a conversion never see these; jobs report a
//! [`FailureReason`](crate::convert::FailureReason) instead.
//!
//! # Example
//!
//! ```ignore
//! use playlist_bridge::error::{Result, ResultExt};
//!
//! async fn show(store: &dyn CheckpointStore, job: &JobId) -> Result<()> {
//!     let record = store.load(job).await.with_context("reading checkpoint")?;
//!     Ok(())
//! }
//! ```

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::convert::JobActive;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Covers what can go wrong around a job: setting up its collaborators and
/// submitting it. Collaborator failures during a run become a
/// [`FailureReason`](crate::convert::FailureReason) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Checkpoint storage error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// HTTP client setup error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A run for the same job is in progress
    #[error(transparent)]
    JobActive(#[from] JobActive),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}
