//! Trait definitions for the external collaborators.
//!
//! These traits enable dependency injection and mocking for tests.
//! Production code uses the manifest lister and the bridge client, while
//! tests substitute the scripted implementations in [`mocks`].
//!
//! # Example
//!
//! ```ignore
//! use playlist_bridge::catalog::traits::CatalogSearch;
//!
//! async fn first_song<C: CatalogSearch>(catalog: &C, track: &Track) {
//!     let hit = catalog.search_songs(&track.title, &track.artists).await?;
//! }
//! ```

use async_trait::async_trait;

use super::domain::{
    Candidate, CatalogError, DEFAULT_BATCH_SIZE, DestinationError, SourceError, SourceList,
};

/// Fetches the ordered track list for a source reference.
#[async_trait]
pub trait SourceLister: Send + Sync {
    async fn fetch(&self, source_ref: &str) -> Result<SourceList, SourceError>;
}

/// Searches the destination catalog.
///
/// Each method returns the collaborator's best candidate for its stage, or
/// `None` when nothing matched.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Search restricted to songs.
    async fn search_songs(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError>;

    /// Search across all entity types.
    async fn search_any(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError>;
}

/// Creates playlists and fills them on the destination.
#[async_trait]
pub trait PlaylistWriter: Send + Sync {
    /// Create an empty playlist and return its id.
    async fn create_playlist(&self, name: &str, description: &str)
    -> Result<String, DestinationError>;

    /// Append ids to a playlist. Callers never pass more than
    /// [`max_batch_size`](Self::max_batch_size) ids at once.
    async fn add_tracks(
        &self,
        playlist_id: &str,
        external_ids: &[String],
    ) -> Result<(), DestinationError>;

    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}

// Implement traits for real clients

#[async_trait]
impl CatalogSearch for super::bridge::BridgeClient {
    async fn search_songs(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError> {
        self.search_songs(title, artists).await
    }

    async fn search_any(
        &self,
        title: &str,
        artists: &[String],
    ) -> Result<Option<Candidate>, CatalogError> {
        self.search_any(title, artists).await
    }
}

#[async_trait]
impl PlaylistWriter for super::bridge::BridgeClient {
    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
    ) -> Result<String, DestinationError> {
        self.create_playlist(name, description).await
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        external_ids: &[String],
    ) -> Result<(), DestinationError> {
        self.add_tracks(playlist_id, external_ids).await
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size()
    }
}

#[async_trait]
impl SourceLister for super::manifest::ManifestLister {
    async fn fetch(&self, source_ref: &str) -> Result<SourceList, SourceError> {
        self.read(source_ref).await
    }
}
