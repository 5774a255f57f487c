//! Catalog collaborators and track matching.
//!
//! This module talks to everything outside the process:
//! - **Source**: reads the ordered track list ([`manifest`])
//! - **Catalog search**: finds destination ids for tracks ([`bridge`])
//! - **Playlist writer**: creates and fills the destination playlist ([`bridge`])
//!
//! # Architecture
//!
//! Collaborators are reached through the traits in [`traits`] so the
//! orchestrator can be tested against scripted mocks. Wire formats stay
//! inside each client; everything else sees the types in [`domain`].
//!
//! - [`matcher`]: Two-stage search for a single track
//! - [`retry`]: Bounded exponential backoff for transient failures

pub mod bridge;
pub mod domain;
pub mod manifest;
pub mod matcher;
pub mod retry;
pub mod traits;

pub use bridge::BridgeClient;
pub use domain::{
    Candidate, CatalogError, DEFAULT_BATCH_SIZE, DestinationError, SourceError, SourceList,
};
pub use manifest::ManifestLister;
pub use matcher::Matcher;
pub use retry::{RetryPolicy, retry_transient};
pub use traits::{CatalogSearch, PlaylistWriter, SourceLister};
