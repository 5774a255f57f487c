//! SQLite checkpoint backend.
//!
//! Uses two tables (see `migrations/`):
//! - `checkpoint_tracks`: one row per resolved track, keyed by `(job_id, track_index)`
//! - `checkpoint_playlists`: one row per job with a destination playlist
//! - `checkpoint_written`: ids already added to that playlist

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{CheckpointError, CheckpointRecord, CheckpointStore, PlaylistProgress};
use crate::model::JobId;

/// Checkpoints stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CheckpointError::io(parent, e))?;
        }

        let db_url = format!("sqlite:{}", path.display());
        if !sqlx::Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, job_id: &JobId) -> Result<CheckpointRecord, CheckpointError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT track_index, external_id FROM checkpoint_tracks WHERE job_id = ? ORDER BY track_index",
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let playlist_id: Option<(String,)> =
            sqlx::query_as("SELECT playlist_id FROM checkpoint_playlists WHERE job_id = ?")
                .bind(job_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let mut record = CheckpointRecord::default();
        for (index, external_id) in rows {
            match usize::try_from(index) {
                Ok(index) => {
                    record.resolved.insert(index, external_id);
                }
                Err(_) => tracing::warn!(job_id = %job_id, index, "Skipping invalid checkpoint row"),
            }
        }

        if let Some((playlist_id,)) = playlist_id {
            let written: Vec<(String,)> = sqlx::query_as(
                "SELECT external_id FROM checkpoint_written WHERE job_id = ? ORDER BY position",
            )
            .bind(job_id.as_str())
            .fetch_all(&self.pool)
            .await?;

            record.playlist = Some(PlaylistProgress {
                playlist_id,
                written: written.into_iter().map(|(id,)| id).collect(),
            });
        }

        Ok(record)
    }

    async fn record(
        &self,
        job_id: &JobId,
        index: usize,
        external_id: &str,
    ) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoint_tracks (job_id, track_index, external_id, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(job_id, track_index) DO UPDATE SET
                external_id = excluded.external_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job_id.as_str())
        .bind(index as i64)
        .bind(external_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_playlist(
        &self,
        job_id: &JobId,
        progress: &PlaylistProgress,
    ) -> Result<(), CheckpointError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO checkpoint_playlists (job_id, playlist_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                playlist_id = excluded.playlist_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job_id.as_str())
        .bind(&progress.playlist_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM checkpoint_written WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        for (position, external_id) in progress.written.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO checkpoint_written (job_id, position, external_id) VALUES (?, ?, ?)",
            )
            .bind(job_id.as_str())
            .bind(position as i64)
            .bind(external_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, job_id: &JobId) -> Result<(), CheckpointError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM checkpoint_tracks WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoint_playlists WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM checkpoint_written WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(job_id = %job_id, "Cleared checkpoint");
        Ok(())
    }
}
