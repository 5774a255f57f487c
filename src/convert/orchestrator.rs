//! Conversion job state machine.
//!
//! ```text
//! Pending ──► Fetching ──► Running ──► Succeeded
//!    │           │            │
//!    └───────────┴────────────┴──────► Failed
//! ```
//!
//! The [`Converter`] fetches the source list, resumes from the checkpoint,
//! resolves the remaining tracks through the bounded pool, reports each
//! result in source order and finally publishes the destination playlist.
//! It is the only writer of its job's checkpoint and progress channel.

use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::pool;
use super::progress::{FailureReason, JobActive, MissingTrack, ProgressEvent, ProgressHub, Subscription};
use super::reorder::ReorderBuffer;
use crate::auth::AuthMonitor;
use crate::catalog::{
    CatalogError, CatalogSearch, DestinationError, Matcher, PlaylistWriter, RetryPolicy,
    SourceError, SourceLister, SourceList, retry_transient,
};
use crate::checkpoint::{CheckpointStore, PlaylistProgress};
use crate::model::{Job, JobId, JobStatus, Outcome, Track};

/// Default number of tracks resolved at once
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default suffix appended to the source name
pub const DEFAULT_NAME_SUFFIX: &str = " (converted)";

/// Tunables for a [`Converter`]
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    pub name_suffix: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
            name_suffix: DEFAULT_NAME_SUFFIX.to_string(),
        }
    }
}

/// How a job run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEnd {
    Succeeded {
        /// `None` when nothing was found
        playlist_id: Option<String>,
        found: usize,
        missing: usize,
    },
    Failed(FailureReason),
    /// Cancelled before completion; no terminal event was emitted
    Aborted,
}

/// A job running on its own task
pub struct RunningJob {
    pub job_id: JobId,
    /// Receives every event of this run
    pub events: Subscription,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<JobEnd>,
}

/// Runs conversion jobs against a set of collaborators.
pub struct Converter {
    source: Arc<dyn SourceLister>,
    matcher: Matcher,
    writer: Arc<dyn PlaylistWriter>,
    store: Arc<dyn CheckpointStore>,
    hub: ProgressHub,
    auth: Option<Arc<AuthMonitor>>,
    options: ConvertOptions,
}

impl Converter {
    pub fn new(
        source: Arc<dyn SourceLister>,
        catalog: Arc<dyn CatalogSearch>,
        writer: Arc<dyn PlaylistWriter>,
        store: Arc<dyn CheckpointStore>,
        hub: ProgressHub,
        options: ConvertOptions,
    ) -> Self {
        Self {
            source,
            matcher: Matcher::new(catalog, options.retry.clone()),
            writer,
            store,
            hub,
            auth: None,
            options,
        }
    }

    /// Require `auth` to be connected before any job starts.
    pub fn with_auth(mut self, auth: Arc<AuthMonitor>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Convert the list behind `source_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`JobActive`] if a run for the same source is in progress.
    /// Every other failure is reported through the job's events and the
    /// returned [`JobEnd`].
    pub async fn convert(
        &self,
        source_ref: &str,
        cancel: CancellationToken,
    ) -> Result<JobEnd, JobActive> {
        let job_id = JobId::from_source_ref(source_ref);
        self.hub.register(&job_id, cancel.clone())?;
        Ok(self.run(job_id, source_ref, None, cancel).await)
    }

    /// Convert a track list the caller already has.
    ///
    /// Tracks are re-indexed by position.
    pub async fn convert_tracks(
        &self,
        source_ref: &str,
        name: impl Into<String>,
        tracks: Vec<Track>,
        cancel: CancellationToken,
    ) -> Result<JobEnd, JobActive> {
        let job_id = JobId::from_source_ref(source_ref);
        self.hub.register(&job_id, cancel.clone())?;
        let list = SourceList {
            name: name.into(),
            tracks,
        };
        Ok(self.run(job_id, source_ref, Some(list), cancel).await)
    }

    /// Start converting `source_ref` on a new task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(self: &Arc<Self>, source_ref: impl Into<String>) -> Result<RunningJob, JobActive> {
        let source_ref = source_ref.into();
        let job_id = JobId::from_source_ref(&source_ref);
        let cancel = CancellationToken::new();
        let events = self.hub.register(&job_id, cancel.clone())?;

        let converter = Arc::clone(self);
        let id = job_id.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { converter.run(id, &source_ref, None, token).await });

        Ok(RunningJob {
            job_id,
            events,
            cancel,
            handle,
        })
    }

    async fn run(
        &self,
        job_id: JobId,
        source_ref: &str,
        supplied: Option<SourceList>,
        cancel: CancellationToken,
    ) -> JobEnd {
        self.hub.emit(
            &job_id,
            ProgressEvent::Started {
                job_id: job_id.clone(),
                total_known: supplied.is_some(),
            },
        );

        if let Some(ref auth) = self.auth {
            let state = auth.status();
            if !state.is_connected() {
                tracing::warn!(job_id = %job_id, auth = %state, "Destination not connected");
                return self.fail(&job_id, FailureReason::AuthInvalid);
            }
        }

        let list = match supplied {
            Some(list) => list,
            None => {
                self.hub.set_status(&job_id, JobStatus::Fetching);
                match self.source.fetch(source_ref).await {
                    Ok(list) => list,
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Failed to fetch source list");
                        return self.fail(&job_id, source_failure(&e));
                    }
                }
            }
        };

        self.drive(job_id, source_ref, list, cancel).await
    }

    async fn drive(
        &self,
        job_id: JobId,
        source_ref: &str,
        list: SourceList,
        cancel: CancellationToken,
    ) -> JobEnd {
        let tracks: Vec<Track> = list
            .tracks
            .into_iter()
            .enumerate()
            .map(|(index, mut track)| {
                track.index = index;
                track
            })
            .collect();
        let total = tracks.len();
        let mut job = Job::new(job_id, list.name, tracks);

        self.hub.emit(
            &job.id,
            ProgressEvent::ListFetched {
                name: job.name.clone(),
                total,
            },
        );
        job.status = JobStatus::Running;
        self.hub.set_status(&job.id, JobStatus::Running);
        tracing::info!(job_id = %job.id, name = %job.name, total, "Converting");

        if total == 0 {
            return self.finish(&mut job, source_ref, None).await;
        }

        let checkpoint = match self.store.load(&job.id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Could not load checkpoint, starting fresh");
                Default::default()
            }
        };

        let mut reorder = ReorderBuffer::new();
        let mut resumed = 0;
        for (&index, external_id) in &checkpoint.resolved {
            let outcome = Outcome::found(external_id.as_str());
            if job.resolve(index, outcome.clone()) {
                resumed += 1;
                self.release(&job, reorder.push(index, outcome));
            }
        }
        if resumed > 0 {
            tracing::info!(job_id = %job.id, resumed, "Resuming from checkpoint");
        }

        let pending: Vec<Track> = job
            .unresolved()
            .into_iter()
            .filter_map(|index| job.tracks.get(index).cloned())
            .collect();

        let pool_cancel = cancel.child_token();
        let matcher = self.matcher.clone();
        let mut results = pin!(pool::run_all(
            pending,
            move |track| {
                let matcher = matcher.clone();
                async move { matcher.resolve(&track).await }
            },
            self.options.max_concurrent,
            pool_cancel.clone(),
        ));

        let mut failure = None;
        while let Some((index, result)) = results.next().await {
            match result {
                Ok(outcome) => {
                    if let Some(external_id) = outcome.external_id()
                        && let Err(e) = self.store.record(&job.id, index, external_id).await
                    {
                        tracing::warn!(job_id = %job.id, index, error = %e, "Checkpoint write failed");
                    }
                    if job.resolve(index, outcome.clone()) {
                        self.release(&job, reorder.push(index, outcome));
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, index, error = %e, "Track resolution failed");
                    if failure.is_none() {
                        failure = Some(catalog_failure(&e));
                        pool_cancel.cancel();
                    }
                }
            }
        }

        if let Some(reason) = failure {
            return self.fail(&job.id, reason);
        }
        if cancel.is_cancelled() {
            tracing::info!(
                job_id = %job.id,
                unresolved = job.unresolved().len(),
                "Job aborted, checkpoint kept"
            );
            return JobEnd::Aborted;
        }

        self.finish(&mut job, source_ref, checkpoint.playlist).await
    }

    /// Emit `TrackResolved` for each released index.
    fn release(&self, job: &Job, ready: Vec<(usize, Outcome)>) {
        for (index, outcome) in ready {
            let Some(track) = job.tracks.get(index) else {
                continue;
            };
            tracing::debug!(job_id = %job.id, index, found = outcome.is_found(), "Track resolved");
            self.hub.emit(
                &job.id,
                ProgressEvent::TrackResolved {
                    index,
                    title: track.title.clone(),
                    artists: track.artists.clone(),
                    outcome,
                },
            );
        }
    }

    async fn finish(
        &self,
        job: &mut Job,
        source_ref: &str,
        saved: Option<PlaylistProgress>,
    ) -> JobEnd {
        let ids = dedupe(job.found_ids());
        let missing_list: Vec<MissingTrack> = job
            .missing_tracks()
            .into_iter()
            .map(MissingTrack::from)
            .collect();
        let missing = missing_list.len();
        let found = job.tracks.len() - missing;

        let playlist_id = if ids.is_empty() {
            None
        } else {
            match self.publish(job, source_ref, &ids, saved).await {
                Ok(playlist_id) => Some(playlist_id),
                Err(reason) => return self.fail(&job.id, reason),
            }
        };

        if let Err(e) = self.store.clear(&job.id).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to clear checkpoint");
        }

        job.status = JobStatus::Succeeded;
        self.hub.complete(
            &job.id,
            JobStatus::Succeeded,
            ProgressEvent::Finished {
                created_playlist_id: playlist_id.clone(),
                found_count: found,
                missing_count: missing,
                missing_list,
            },
        );
        tracing::info!(
            job_id = %job.id,
            found,
            missing,
            playlist_id = playlist_id.as_deref().unwrap_or("-"),
            "Conversion finished"
        );

        JobEnd::Succeeded {
            playlist_id,
            found,
            missing,
        }
    }

    /// Create (or reuse) the playlist and add whichever of `ids` it lacks, in batches.
    async fn publish(
        &self,
        job: &Job,
        source_ref: &str,
        ids: &[String],
        saved: Option<PlaylistProgress>,
    ) -> Result<String, FailureReason> {
        let writer = self.writer.as_ref();
        let retry = &self.options.retry;

        let mut progress = match saved {
            Some(progress) => {
                tracing::info!(
                    job_id = %job.id,
                    playlist_id = %progress.playlist_id,
                    written = progress.written.len(),
                    "Reusing playlist from checkpoint"
                );
                progress
            }
            None => {
                let name = format!("{}{}", job.name, self.options.name_suffix);
                let description = format!("Converted from {}", source_ref);
                let playlist_id = retry_transient(retry, "create playlist", || {
                    writer.create_playlist(&name, &description)
                })
                .await
                .map_err(|e| destination_failure(&job.id, &e))?;

                tracing::info!(job_id = %job.id, playlist_id = %playlist_id, "Created playlist");
                let progress = PlaylistProgress::new(playlist_id);
                self.save_playlist(&job.id, &progress).await;
                progress
            }
        };

        let pending: Vec<String> = {
            let written: HashSet<&str> = progress.written.iter().map(String::as_str).collect();
            ids.iter()
                .filter(|id| !written.contains(id.as_str()))
                .cloned()
                .collect()
        };

        let batch_size = writer.max_batch_size().max(1);
        for batch in pending.chunks(batch_size) {
            let playlist_id = progress.playlist_id.as_str();
            retry_transient(retry, "add tracks", || writer.add_tracks(playlist_id, batch))
                .await
                .map_err(|e| destination_failure(&job.id, &e))?;

            progress.written.extend_from_slice(batch);
            tracing::debug!(
                job_id = %job.id,
                written = progress.written.len(),
                pending = pending.len(),
                "Added batch"
            );
            self.save_playlist(&job.id, &progress).await;
        }

        Ok(progress.playlist_id)
    }

    async fn save_playlist(&self, job_id: &JobId, progress: &PlaylistProgress) {
        if let Err(e) = self.store.record_playlist(job_id, progress).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to checkpoint playlist progress");
        }
    }

    fn fail(&self, job_id: &JobId, reason: FailureReason) -> JobEnd {
        tracing::warn!(job_id = %job_id, ?reason, "Job failed: {}", reason);
        self.hub
            .complete(job_id, JobStatus::Failed, ProgressEvent::Failed { reason });
        JobEnd::Failed(reason)
    }
}

fn source_failure(error: &SourceError) -> FailureReason {
    match error {
        SourceError::Unavailable(_) => FailureReason::SourceUnavailable,
        SourceError::InvalidReference(_) => FailureReason::InvalidSource,
    }
}

fn catalog_failure(error: &CatalogError) -> FailureReason {
    match error {
        CatalogError::Unauthorized(_) => FailureReason::AuthInvalid,
        CatalogError::Unavailable(_) => FailureReason::DestinationUnavailable,
    }
}

fn destination_failure(job_id: &JobId, error: &DestinationError) -> FailureReason {
    tracing::warn!(job_id = %job_id, error = %error, "Destination write failed");
    match error {
        DestinationError::Rejected(_) => FailureReason::DestinationRejected,
        DestinationError::Unavailable(_) => FailureReason::DestinationUnavailable,
        DestinationError::Unauthorized(_) => FailureReason::AuthInvalid,
    }
}

/// Drop repeated ids, keeping first occurrences in order.
fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mocks::{ScriptedFlow, connected_monitor};
    use crate::catalog::traits::mocks::{MockCatalog, MockSource, MockWriter};
    use crate::checkpoint::JsonCheckpointStore;
    use crate::test_utils::{drain, temp_json_store};
    use std::time::Duration;
    use tempfile::TempDir;

    const SOURCE: &str = "https://open.spotify.com/playlist/road123";

    struct Fixture {
        converter: Arc<Converter>,
        catalog: Arc<MockCatalog>,
        writer: Arc<MockWriter>,
        store: Arc<JsonCheckpointStore>,
        _dir: TempDir,
    }

    fn options(max_concurrent: usize) -> ConvertOptions {
        ConvertOptions {
            max_concurrent,
            ..Default::default()
        }
    }

    fn fixture(source: MockSource, catalog: MockCatalog, writer: MockWriter) -> Fixture {
        let (store, dir) = temp_json_store();
        fixture_with_store(source, catalog, writer, store, dir, options(5))
    }

    fn fixture_with_store(
        source: MockSource,
        catalog: MockCatalog,
        writer: MockWriter,
        store: Arc<JsonCheckpointStore>,
        dir: TempDir,
        options: ConvertOptions,
    ) -> Fixture {
        let catalog = Arc::new(catalog);
        let writer = Arc::new(writer);
        let converter = Converter::new(
            Arc::new(source),
            catalog.clone(),
            writer.clone(),
            store.clone(),
            ProgressHub::default(),
            options,
        );
        Fixture {
            converter: Arc::new(converter),
            catalog,
            writer,
            store,
            _dir: dir,
        }
    }

    fn three_tracks() -> MockSource {
        MockSource::with_tracks("Road Trip", &[("A", "X"), ("B", "Y"), ("C", "Z")])
    }

    async fn run(fixture: &Fixture) -> (JobEnd, Vec<ProgressEvent>) {
        let job = fixture.converter.submit(SOURCE).unwrap();
        let end = job.handle.await.unwrap();
        let events = drain(job.events).await;
        (end, events)
    }

    fn resolved_indices(events: &[ProgressEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::TrackResolved { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn job_id() -> JobId {
        JobId::from_source_ref(SOURCE)
    }

    #[tokio::test]
    async fn test_three_track_conversion() {
        let fx = fixture(
            three_tracks(),
            MockCatalog::new().song("A", "a1").any("B", "b2"),
            MockWriter::new(),
        );

        let (end, events) = run(&fx).await;

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: Some("PL-1".into()),
                found: 2,
                missing: 1,
            }
        );
        assert!(matches!(events[0], ProgressEvent::Snapshot { status: JobStatus::Pending, .. }));
        assert!(matches!(events[1], ProgressEvent::Started { total_known: false, .. }));
        assert_eq!(
            events[2],
            ProgressEvent::ListFetched {
                name: "Road Trip".into(),
                total: 3,
            }
        );
        assert_eq!(resolved_indices(&events), vec![0, 1, 2]);
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Finished {
                created_playlist_id: Some("PL-1".into()),
                found_count: 2,
                missing_count: 1,
                missing_list: vec![MissingTrack {
                    index: 2,
                    title: "C".into(),
                    artists: vec!["Z".into()],
                }],
            })
        );

        assert_eq!(fx.writer.created(), vec!["Road Trip (converted)".to_string()]);
        assert_eq!(
            fx.writer.batches(),
            vec![("PL-1".to_string(), vec!["a1".to_string(), "b2".to_string()])]
        );
        assert!(fx.store.load(&job_id()).await.unwrap().is_empty());
        assert_eq!(fx.converter.hub().status(&job_id()), Some(JobStatus::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_ordered_despite_out_of_order_completion() {
        let fx = fixture(
            three_tracks(),
            MockCatalog::new()
                .song("A", "a")
                .delay("A", Duration::from_millis(300))
                .song("B", "b")
                .delay("B", Duration::from_millis(100))
                .song("C", "c"),
            MockWriter::new(),
        );

        let (_, events) = run(&fx).await;
        assert_eq!(resolved_indices(&events), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_source_failure_touches_nothing() {
        let fx = fixture(
            MockSource::with_error(SourceError::Unavailable("timeout".into())),
            MockCatalog::new(),
            MockWriter::new(),
        );

        let (end, events) = run(&fx).await;

        assert_eq!(end, JobEnd::Failed(FailureReason::SourceUnavailable));
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], ProgressEvent::Started { .. }));
        assert_eq!(
            events[2],
            ProgressEvent::Failed {
                reason: FailureReason::SourceUnavailable,
            }
        );
        assert_eq!(fx.catalog.queries(), 0);
        assert!(!fx.store.path_for(&job_id()).exists());
    }

    #[tokio::test]
    async fn test_invalid_source() {
        let fx = fixture(
            MockSource::with_error(SourceError::InvalidReference("404".into())),
            MockCatalog::new(),
            MockWriter::new(),
        );
        let (end, _) = run(&fx).await;
        assert_eq!(end, JobEnd::Failed(FailureReason::InvalidSource));
    }

    #[tokio::test]
    async fn test_empty_list_succeeds_without_playlist() {
        let fx = fixture(
            MockSource::with_tracks("Empty", &[]),
            MockCatalog::new(),
            MockWriter::new(),
        );

        let (end, events) = run(&fx).await;

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: None,
                found: 0,
                missing: 0,
            }
        );
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Finished { created_playlist_id: None, found_count: 0, .. })
        ));
        assert!(fx.writer.created().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_found_creates_no_playlist() {
        let fx = fixture(three_tracks(), MockCatalog::new(), MockWriter::new());
        let (end, _) = run(&fx).await;
        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: None,
                found: 0,
                missing: 3,
            }
        );
        assert!(fx.writer.created().is_empty());
    }

    #[tokio::test]
    async fn test_resume_queries_only_unresolved_tracks() {
        let fx = fixture(
            three_tracks(),
            MockCatalog::new().song("A", "new-a").song("B", "new-b").song("C", "c"),
            MockWriter::new(),
        );
        fx.store.record(&job_id(), 0, "a").await.unwrap();
        fx.store.record(&job_id(), 1, "b").await.unwrap();

        let (end, events) = run(&fx).await;

        assert!(matches!(end, JobEnd::Succeeded { found: 3, .. }));
        assert_eq!(fx.catalog.queries(), 1);
        assert_eq!(fx.catalog.queries_for("C").len(), 1);
        assert_eq!(resolved_indices(&events), vec![0, 1, 2]);
        assert_eq!(
            fx.writer.batches()[0].1,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fully_checkpointed_job_makes_no_queries() {
        let fx = fixture(three_tracks(), MockCatalog::new(), MockWriter::new());
        for (index, id) in ["a", "b", "c"].iter().enumerate() {
            fx.store.record(&job_id(), index, id).await.unwrap();
        }
        // Entries beyond the list are ignored
        fx.store.record(&job_id(), 9, "stale").await.unwrap();

        let (end, _) = run(&fx).await;

        assert!(matches!(end, JobEnd::Succeeded { found: 3, missing: 0, .. }));
        assert_eq!(fx.catalog.queries(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_job_and_keeps_checkpoint() {
        let (store, dir) = temp_json_store();
        let fx = fixture_with_store(
            three_tracks(),
            MockCatalog::new()
                .song("A", "a")
                .failing("B", CatalogError::Unauthorized("401".into())),
            MockWriter::new(),
            store,
            dir,
            options(1),
        );

        let (end, events) = run(&fx).await;

        assert_eq!(end, JobEnd::Failed(FailureReason::AuthInvalid));
        assert!(fx.catalog.queries_for("C").is_empty());
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Failed {
                reason: FailureReason::AuthInvalid,
            })
        );
        let record = fx.store.load(&job_id()).await.unwrap();
        assert_eq!(record.resolved.get(&0).map(String::as_str), Some("a"));
        assert_eq!(fx.converter.hub().status(&job_id()), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_destination_failure_then_resume_reuses_playlist() {
        let (store, dir) = temp_json_store();
        let first = fixture_with_store(
            three_tracks(),
            MockCatalog::new().song("A", "a").song("B", "b"),
            MockWriter::new().failing_adds(DestinationError::Rejected("quota".into())),
            store.clone(),
            dir,
            options(5),
        );

        let (end, _) = run(&first).await;
        assert_eq!(end, JobEnd::Failed(FailureReason::DestinationRejected));

        let record = store.load(&job_id()).await.unwrap();
        assert_eq!(record.resolved.len(), 2);
        assert_eq!(record.playlist, Some(PlaylistProgress::new("PL-1")));

        let (_, dir) = temp_json_store();
        let second = fixture_with_store(
            three_tracks(),
            MockCatalog::new(),
            MockWriter::new(),
            store.clone(),
            dir,
            options(5),
        );
        let (end, _) = run(&second).await;

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: Some("PL-1".into()),
                found: 2,
                missing: 1,
            }
        );
        // Only the previously missing track is searched again
        assert_eq!(second.catalog.queries_for("C").len(), 2);
        assert_eq!(second.catalog.queries(), 2);
        assert!(second.writer.created().is_empty());
        assert_eq!(
            second.writer.batches(),
            vec![("PL-1".to_string(), vec!["a".to_string(), "b".to_string()])]
        );
        assert!(store.load(&job_id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_resume_after_already_added_ids() {
        let tracks: Vec<(String, String)> =
            (0..5).map(|i| (format!("T{}", i), "Artist".to_string())).collect();
        let refs: Vec<(&str, &str)> = tracks.iter().map(|(t, a)| (t.as_str(), a.as_str())).collect();
        let fx = fixture(
            MockSource::with_tracks("Five", &refs),
            MockCatalog::new(),
            MockWriter::new().with_batch_size(2),
        );
        for index in 0..5 {
            fx.store.record(&job_id(), index, &format!("id{}", index)).await.unwrap();
        }
        fx.store
            .record_playlist(
                &job_id(),
                &PlaylistProgress {
                    playlist_id: "PL-7".into(),
                    written: vec!["id0".into(), "id1".into()],
                },
            )
            .await
            .unwrap();

        let (end, _) = run(&fx).await;

        assert!(matches!(end, JobEnd::Succeeded { found: 5, .. }));
        assert_eq!(
            fx.writer.batches(),
            vec![
                ("PL-7".to_string(), vec!["id2".to_string(), "id3".to_string()]),
                ("PL-7".to_string(), vec!["id4".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_resume_writes_track_found_ahead_of_written_ids() {
        // Run 1 wrote "b" and then failed; "A" had run out of retries
        let fx = fixture(
            three_tracks(),
            MockCatalog::new().song("A", "a"),
            MockWriter::new().with_batch_size(1),
        );
        fx.store.record(&job_id(), 1, "b").await.unwrap();
        fx.store.record(&job_id(), 2, "c").await.unwrap();
        fx.store
            .record_playlist(
                &job_id(),
                &PlaylistProgress {
                    playlist_id: "PL-7".into(),
                    written: vec!["b".into()],
                },
            )
            .await
            .unwrap();

        let (end, _) = run(&fx).await;

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: Some("PL-7".into()),
                found: 3,
                missing: 0,
            }
        );
        assert_eq!(fx.catalog.queries(), 1);
        assert_eq!(
            fx.writer.batches(),
            vec![
                ("PL-7".to_string(), vec!["a".to_string()]),
                ("PL-7".to_string(), vec!["c".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_publish_checkpoints_written_ids() {
        let (store, dir) = temp_json_store();
        let fx = fixture_with_store(
            three_tracks(),
            MockCatalog::new().song("A", "a").song("B", "b").song("C", "c"),
            MockWriter::new()
                .with_batch_size(2)
                .failing_adds_after(1, DestinationError::Rejected("quota".into())),
            store,
            dir,
            options(5),
        );

        let (end, _) = run(&fx).await;

        assert_eq!(end, JobEnd::Failed(FailureReason::DestinationRejected));
        let playlist = fx.store.load(&job_id()).await.unwrap().playlist.unwrap();
        assert_eq!(playlist.playlist_id, "PL-1");
        assert_eq!(playlist.written, vec!["a", "b"]);
    }

    fn four_tracks() -> MockSource {
        MockSource::with_tracks(
            "Four",
            &[("A", "W"), ("B", "X"), ("C", "Y"), ("D", "Z")],
        )
    }

    fn four_found() -> MockCatalog {
        MockCatalog::new().song("A", "a").song("B", "b").song("C", "c").song("D", "d")
    }

    fn four_ids() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_found_then_batch_write_fails_resumes_without_queries() {
        let (store, dir) = temp_json_store();
        let first = fixture_with_store(
            four_tracks(),
            four_found(),
            MockWriter::new().failing_adds(DestinationError::Rejected("quota".into())),
            store.clone(),
            dir,
            options(5),
        );

        let (end, events) = run(&first).await;
        assert_eq!(end, JobEnd::Failed(FailureReason::DestinationRejected));
        assert!(matches!(events.last(), Some(ProgressEvent::Failed { .. })));

        let record = store.load(&job_id()).await.unwrap();
        assert_eq!(record.resolved.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let (_, dir) = temp_json_store();
        let second = fixture_with_store(
            four_tracks(),
            MockCatalog::new(),
            MockWriter::new(),
            store.clone(),
            dir,
            options(5),
        );
        let (end, events) = run(&second).await;

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: Some("PL-1".into()),
                found: 4,
                missing: 0,
            }
        );
        assert_eq!(second.catalog.queries(), 0);
        assert_eq!(resolved_indices(&events), vec![0, 1, 2, 3]);
        assert!(second.writer.created().is_empty());
        assert_eq!(second.writer.batches(), vec![("PL-1".to_string(), four_ids())]);
    }

    #[tokio::test]
    async fn test_all_found_then_create_fails_retries_creation_without_queries() {
        let (store, dir) = temp_json_store();
        let first = fixture_with_store(
            four_tracks(),
            four_found(),
            MockWriter::new().failing_create(DestinationError::Rejected("quota".into())),
            store.clone(),
            dir,
            options(5),
        );

        let (end, _) = run(&first).await;
        assert_eq!(end, JobEnd::Failed(FailureReason::DestinationRejected));
        let record = store.load(&job_id()).await.unwrap();
        assert_eq!(record.resolved.len(), 4);
        assert!(record.playlist.is_none());

        let (_, dir) = temp_json_store();
        let second = fixture_with_store(
            four_tracks(),
            MockCatalog::new(),
            MockWriter::new(),
            store.clone(),
            dir,
            options(5),
        );
        let (end, _) = run(&second).await;

        assert!(matches!(end, JobEnd::Succeeded { found: 4, missing: 0, .. }));
        assert_eq!(second.catalog.queries(), 0);
        assert_eq!(second.writer.created(), vec!["Four (converted)".to_string()]);
        assert_eq!(second.writer.batches(), vec![("PL-1".to_string(), four_ids())]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_added_once() {
        let fx = fixture(
            three_tracks(),
            MockCatalog::new().song("A", "same").song("B", "same").song("C", "other"),
            MockWriter::new(),
        );

        let (end, _) = run(&fx).await;

        assert!(matches!(end, JobEnd::Succeeded { found: 3, missing: 0, .. }));
        assert_eq!(
            fx.writer.batches()[0].1,
            vec!["same".to_string(), "other".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_keeps_checkpoint_and_emits_no_terminal_event() {
        let (store, dir) = temp_json_store();
        let fx = fixture_with_store(
            three_tracks(),
            MockCatalog::new()
                .song("A", "a")
                .song("B", "b")
                .delay("B", Duration::from_secs(5))
                .song("C", "c"),
            MockWriter::new(),
            store,
            dir,
            options(1),
        );

        let mut job = fx.converter.submit(SOURCE).unwrap();
        loop {
            match job.events.recv().await {
                Some(ProgressEvent::TrackResolved { index: 0, .. }) => break,
                Some(_) => continue,
                None => panic!("stream ended early"),
            }
        }
        assert!(fx.converter.hub().abort(&job.job_id));

        let end = job.handle.await.unwrap();
        assert_eq!(end, JobEnd::Aborted);
        assert_eq!(fx.converter.hub().status(&job_id()), Some(JobStatus::Running));

        // The in-flight track still finishes, the last one never starts
        assert!(fx.catalog.queries_for("C").is_empty());
        let record = fx.store.load(&job_id()).await.unwrap();
        assert_eq!(record.resolved.len(), 2);

        fx.converter.hub().forget(&job_id());
        let rest = drain(job.events).await;
        assert_eq!(resolved_indices(&rest), vec![1]);
        assert!(!rest.iter().any(ProgressEvent::is_terminal));
    }

    #[tokio::test]
    async fn test_second_submit_while_running_is_rejected() {
        let fx = fixture(three_tracks(), MockCatalog::new(), MockWriter::new());
        let cancel = CancellationToken::new();
        let _events = fx.converter.hub().register(&job_id(), cancel).unwrap();

        assert!(fx.converter.submit(SOURCE).is_err());
    }

    #[tokio::test]
    async fn test_supplied_tracks_are_reindexed() {
        let fx = fixture(
            MockSource::with_error(SourceError::Unavailable("unused".into())),
            MockCatalog::new().song("Second", "s"),
            MockWriter::new(),
        );
        let tracks = vec![
            Track::new(7, "First", vec![]),
            Track::new(3, "Second", vec![]),
        ];

        let end = fx
            .converter
            .convert_tracks(SOURCE, "Given", tracks, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            end,
            JobEnd::Succeeded {
                playlist_id: Some("PL-1".into()),
                found: 1,
                missing: 1,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_auth_fails_before_fetching() {
        let (store, dir) = temp_json_store();
        let mut fx = fixture_with_store(
            three_tracks(),
            MockCatalog::new().song("A", "a"),
            MockWriter::new(),
            store,
            dir,
            options(5),
        );
        let monitor = Arc::new(AuthMonitor::new(
            Arc::new(ScriptedFlow::succeeding()),
            Duration::from_secs(5),
        ));
        fx.converter = Arc::new(
            Converter::new(
                Arc::new(three_tracks()),
                fx.catalog.clone(),
                fx.writer.clone(),
                fx.store.clone(),
                ProgressHub::default(),
                options(5),
            )
            .with_auth(monitor),
        );

        let (end, _) = run(&fx).await;
        assert_eq!(end, JobEnd::Failed(FailureReason::AuthInvalid));
        assert_eq!(fx.catalog.queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_auth_lets_job_run() {
        let fx = fixture(three_tracks(), MockCatalog::new().song("A", "a"), MockWriter::new());
        let converter = Arc::new(
            Converter::new(
                Arc::new(three_tracks()),
                fx.catalog.clone(),
                fx.writer.clone(),
                fx.store.clone(),
                ProgressHub::default(),
                options(5),
            )
            .with_auth(connected_monitor().await),
        );

        let end = converter
            .convert(SOURCE, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(end, JobEnd::Succeeded { found: 1, .. }));
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let ids = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe(ids), vec!["b", "a", "c"]);
    }
}
