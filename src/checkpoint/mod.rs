//! Durable per-job progress.
//!
//! A checkpoint maps track index to the external id it resolved to, plus the
//! destination playlist once one exists. It is written incrementally while a
//! job runs, read once when the job enters `Running`, and deleted when the
//! job succeeds. Failed or interrupted jobs keep theirs so that the next
//! submission of the same source resumes.
//!
//! Only `Found` outcomes are stored; `Missing` tracks are searched again on
//! resume.
//!
//! Two backends:
//! - [`JsonCheckpointStore`]: one `checkpoint_<job>.json` file per job
//! - [`SqliteCheckpointStore`]: two tables in a SQLite database

mod file;
mod sqlite;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::model::JobId;

pub use file::JsonCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

/// Destination playlist created for a job and the ids already written to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistProgress {
    pub playlist_id: String,
    /// External ids added so far, in write order
    #[serde(default)]
    pub written: Vec<String>,
}

impl PlaylistProgress {
    pub fn new(playlist_id: impl Into<String>) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            written: Vec::new(),
        }
    }
}

/// Everything persisted for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRecord {
    /// Track index → external id (found tracks only)
    pub resolved: BTreeMap<usize, String>,
    pub playlist: Option<PlaylistProgress>,
}

impl CheckpointRecord {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.playlist.is_none()
    }
}

/// Checkpoint storage errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Checkpoint migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl CheckpointError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Persistent store of per-job checkpoints.
///
/// Implementations are shared between concurrently running jobs; each job
/// only touches its own key.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the record for `job_id`. Absent or unreadable records are empty.
    async fn load(&self, job_id: &JobId) -> Result<CheckpointRecord, CheckpointError>;

    /// Persist one resolved track, overwriting any previous id at `index`.
    async fn record(
        &self,
        job_id: &JobId,
        index: usize,
        external_id: &str,
    ) -> Result<(), CheckpointError>;

    /// Persist the destination playlist and the ids written to it.
    async fn record_playlist(
        &self,
        job_id: &JobId,
        progress: &PlaylistProgress,
    ) -> Result<(), CheckpointError>;

    /// Remove the record. Succeeds when nothing is stored.
    async fn clear(&self, job_id: &JobId) -> Result<(), CheckpointError>;
}

/// Open the store selected by the `[checkpoint]` config section.
pub async fn open(config: &CheckpointConfig) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    match config.backend {
        CheckpointBackend::Json => {
            let dir = config.directory();
            tracing::debug!("Using JSON checkpoints in {:?}", dir);
            Ok(Arc::new(JsonCheckpointStore::new(dir)))
        }
        CheckpointBackend::Sqlite => {
            let path = config.database();
            tracing::debug!("Using SQLite checkpoints at {:?}", path);
            let store = SqliteCheckpointStore::open(&path).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_json_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig {
            backend: CheckpointBackend::Json,
            directory: Some(dir.path().to_path_buf()),
            database: None,
        };
        let store = open(&config).await.unwrap();
        let job = JobId::from_source_ref("mix.json");

        store.record(&job, 0, "vid").await.unwrap();
        assert_eq!(store.load(&job).await.unwrap().resolved.len(), 1);
    }

    #[tokio::test]
    async fn test_open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig {
            backend: CheckpointBackend::Sqlite,
            directory: None,
            database: Some(dir.path().join("checkpoints.db")),
        };
        let store = open(&config).await.unwrap();
        let job = JobId::from_source_ref("mix.json");

        assert!(store.load(&job).await.unwrap().is_empty());
    }
}
