//! Test utilities and fixtures for playlist-bridge tests.
//!
//! This module provides common test helpers and temporary stores to reduce
//! boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use playlist_bridge::test_utils::{temp_json_store, tracks};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (store, _dir) = temp_json_store();
//!     let tracks = tracks(3);
//!     // ... test logic
//! }
//! ```

use std::sync::Arc;

use tempfile::TempDir;

use crate::checkpoint::{JsonCheckpointStore, SqliteCheckpointStore};
use crate::convert::{ProgressEvent, Subscription};
use crate::model::Track;

/// Creates `n` tracks titled "Track 0".."Track n-1", one artist each.
pub fn tracks(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| Track::new(i, format!("Track {}", i), vec![format!("Artist {}", i)]))
        .collect()
}

/// Creates a JSON checkpoint store in a temporary directory.
///
/// Keep the `TempDir` alive for the duration of your test.
pub fn temp_json_store() -> (Arc<JsonCheckpointStore>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store = JsonCheckpointStore::new(dir.path().join("checkpoints"));
    (Arc::new(store), dir)
}

/// Creates a SQLite checkpoint store in a temporary directory.
///
/// Migrations are run automatically.
pub async fn temp_sqlite_store() -> (SqliteCheckpointStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store = SqliteCheckpointStore::open(&dir.path().join("test.db"))
        .await
        .expect("Failed to initialize test database");
    (store, dir)
}

/// Collects events until the subscription ends.
pub async fn drain(mut subscription: Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_are_indexed_by_position() {
        let tracks = tracks(3);
        assert_eq!(tracks.len(), 3);
        assert!(tracks.iter().enumerate().all(|(i, t)| t.index == i));
        assert_eq!(tracks[2].title, "Track 2");
    }

    #[tokio::test]
    async fn test_temp_sqlite_store_is_usable() {
        use crate::checkpoint::CheckpointStore;
        use crate::model::JobId;

        let (store, _dir) = temp_sqlite_store().await;
        assert!(store.load(&JobId::from_source_ref("x")).await.unwrap().is_empty());
    }
}
