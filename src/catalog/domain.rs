//! Internal domain models for catalog collaborators.
//!
//! These types are OUR types - collaborator implementations convert their
//! wire formats into these before anything reaches the matcher or the
//! orchestrator.

use crate::model::Track;

/// Default number of ids a destination accepts per add request.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Best match returned by one catalog search stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Destination catalog id of the matched entity
    pub external_id: String,
    /// Entity kind as reported by the catalog (song, video, ...)
    pub result_type: Option<String>,
}

impl Candidate {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            result_type: None,
        }
    }
}

/// Ordered track list obtained from the source collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceList {
    /// Display name of the source playlist
    pub name: String,
    /// Tracks in source order
    pub tracks: Vec<Track>,
}

/// Errors from the source lister
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid source reference: {0}")]
    InvalidReference(String),
}

/// Errors from catalog search.
///
/// "No candidate" is not an error; searches return `Ok(None)` for that.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog rejected credentials: {0}")]
    Unauthorized(String),
}

/// Errors from the playlist writer
#[derive(Debug, Clone, thiserror::Error)]
pub enum DestinationError {
    #[error("Destination rejected request: {0}")]
    Rejected(String),

    #[error("Destination unavailable: {0}")]
    Unavailable(String),

    #[error("Destination rejected credentials: {0}")]
    Unauthorized(String),
}

/// Errors worth another attempt after a pause.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for CatalogError {
    fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Unavailable(_))
    }
}

impl Retryable for DestinationError {
    fn is_retryable(&self) -> bool {
        matches!(self, DestinationError::Unavailable(_))
    }
}
