//! JSON file checkpoint backend.
//!
//! Writes go to `checkpoint_<job>.json.tmp` first and are renamed over the
//! real file, so a crash leaves either the previous or the new checkpoint.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CheckpointError, CheckpointRecord, CheckpointStore, PlaylistProgress};
use crate::model::JobId;

const FORMAT_VERSION: u32 = 1;

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    resolved: BTreeMap<usize, String>,
    #[serde(default)]
    playlist: Option<PlaylistProgress>,
}

type JobLock = Arc<tokio::sync::Mutex<()>>;

/// One JSON file per job in a directory.
pub struct JsonCheckpointStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on the same file
    job_locks: Mutex<HashMap<JobId, JobLock>>,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            job_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, job_id: &JobId) -> JobLock {
        Arc::clone(self.job_locks.lock().entry(job_id.clone()).or_default())
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    fn release_lock(&self, job_id: &JobId, lock: &JobLock) {
        let mut locks = self.job_locks.lock();
        // The map and the caller hold the only references
        if Arc::strong_count(lock) == 2 {
            locks.remove(job_id);
        }
    }

    /// Path of the checkpoint file for `job_id`.
    pub fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", job_id))
    }

    async fn read(&self, path: &Path) -> Result<CheckpointRecord, CheckpointError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CheckpointRecord::default());
            }
            Err(e) => return Err(CheckpointError::io(path, e)),
        };

        match serde_json::from_str::<CheckpointFile>(&contents) {
            Ok(file) => Ok(CheckpointRecord {
                resolved: file.resolved,
                playlist: file.playlist,
            }),
            Err(e) => {
                tracing::warn!("Ignoring corrupt checkpoint {:?}: {}", path, e);
                Ok(CheckpointRecord::default())
            }
        }
    }

    async fn write(&self, path: &Path, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::io(&self.dir, e))?;

        let file = CheckpointFile {
            version: FORMAT_VERSION,
            updated_at: Utc::now(),
            resolved: record.resolved.clone(),
            playlist: record.playlist.clone(),
        };
        let contents = serde_json::to_vec_pretty(&file)?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| CheckpointError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| CheckpointError::io(path, e))?;
        Ok(())
    }

    async fn update(
        &self,
        job_id: &JobId,
        apply: impl FnOnce(&mut CheckpointRecord) + Send,
    ) -> Result<(), CheckpointError> {
        let lock = self.lock_for(job_id);
        let guard = lock.lock().await;
        let path = self.path_for(job_id);
        let result = match self.read(&path).await {
            Ok(mut record) => {
                apply(&mut record);
                self.write(&path, &record).await
            }
            Err(e) => Err(e),
        };
        drop(guard);
        self.release_lock(job_id, &lock);
        result
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn load(&self, job_id: &JobId) -> Result<CheckpointRecord, CheckpointError> {
        self.read(&self.path_for(job_id)).await
    }

    async fn record(
        &self,
        job_id: &JobId,
        index: usize,
        external_id: &str,
    ) -> Result<(), CheckpointError> {
        self.update(job_id, |record| {
            record.resolved.insert(index, external_id.to_string());
        })
        .await
    }

    async fn record_playlist(
        &self,
        job_id: &JobId,
        progress: &PlaylistProgress,
    ) -> Result<(), CheckpointError> {
        self.update(job_id, |record| {
            record.playlist = Some(progress.clone());
        })
        .await
    }

    async fn clear(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        let lock = self.lock_for(job_id);
        let guard = lock.lock().await;
        let path = self.path_for(job_id);
        let result = match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "Cleared checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::io(path, e)),
        };
        drop(guard);
        self.release_lock(job_id, &lock);
        result
    }
}
