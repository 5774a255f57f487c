//! Per-job progress broadcasting.
//!
//! Every job gets a broadcast channel in the [`ProgressHub`]. Observers can
//! join at any time: their [`Subscription`] starts with a synthetic
//! [`ProgressEvent::Snapshot`] of the job's current state, then follows
//! live events. With no observers, events are simply dropped.
//!
//! Finished jobs stay queryable until they have no observers and more than
//! the hub's retention limit of newer finished jobs exist; [`ProgressHub::forget`]
//! drops one immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::model::{JobId, JobStatus, Outcome, Track};

/// Default per-job channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default number of finished, unobserved jobs kept for status queries
pub const DEFAULT_FINISHED_RETENTION: usize = 32;

/// Why a job failed, as shown to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    /// Track list could not be fetched right now
    SourceUnavailable,
    /// The source reference is wrong or unsupported
    InvalidSource,
    /// Destination credentials are missing or were rejected
    AuthInvalid,
    /// The destination refused the request
    DestinationRejected,
    /// The destination could not be reached
    DestinationUnavailable,
}

impl FailureReason {
    /// Whether retrying the same job later may succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureReason::SourceUnavailable | FailureReason::DestinationUnavailable
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            FailureReason::SourceUnavailable => {
                "The source playlist could not be fetched. Try again later."
            }
            FailureReason::InvalidSource => {
                "The source reference is invalid or the playlist is not accessible."
            }
            FailureReason::AuthInvalid => {
                "Destination credentials are missing or expired. Reconnect and try again."
            }
            FailureReason::DestinationRejected => "The destination rejected the playlist.",
            FailureReason::DestinationUnavailable => {
                "The destination is unreachable. Progress was saved; try again later."
            }
        };
        f.write_str(message)
    }
}

/// Track reported as missing in the final summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingTrack {
    pub index: usize,
    pub title: String,
    pub artists: Vec<String>,
}

impl From<&Track> for MissingTrack {
    fn from(track: &Track) -> Self {
        Self {
            index: track.index,
            title: track.title.clone(),
            artists: track.artists.clone(),
        }
    }
}

/// Progress of one job.
///
/// Per job: `Started`, `ListFetched`, every `TrackResolved` in ascending
/// index order, then exactly one of `Finished`/`Failed` (none if aborted).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Started {
        job_id: JobId,
        /// True when the caller supplied the track list up front
        total_known: bool,
    },
    ListFetched {
        name: String,
        total: usize,
    },
    TrackResolved {
        index: usize,
        title: String,
        artists: Vec<String>,
        outcome: Outcome,
    },
    Finished {
        created_playlist_id: Option<String>,
        found_count: usize,
        missing_count: usize,
        missing_list: Vec<MissingTrack>,
    },
    Failed {
        reason: FailureReason,
    },
    /// First event of every subscription
    Snapshot {
        job_id: JobId,
        status: JobStatus,
        name: Option<String>,
        total: Option<usize>,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }
}

/// A job id is already being converted
#[derive(Debug, Clone, thiserror::Error)]
#[error("Job {0} is already running")]
pub struct JobActive(pub JobId);

struct JobChannel {
    sender: broadcast::Sender<ProgressEvent>,
    status: JobStatus,
    list: Option<(String, usize)>,
    cancel: CancellationToken,
    /// Hub sequence number of the last registration or completion
    touched: u64,
}

impl JobChannel {
    fn is_active(&self) -> bool {
        !self.status.is_terminal() && !self.cancel.is_cancelled()
    }

    fn is_evictable(&self) -> bool {
        !self.is_active() && self.sender.receiver_count() == 0
    }

    fn snapshot(&self, job_id: &JobId) -> ProgressEvent {
        let (name, total) = match self.list {
            Some((ref name, total)) => (Some(name.clone()), Some(total)),
            None => (None, None),
        };
        ProgressEvent::Snapshot {
            job_id: job_id.clone(),
            status: self.status,
            name,
            total,
        }
    }
}

/// Registry of per-job progress channels.
#[derive(Clone)]
pub struct ProgressHub {
    jobs: Arc<RwLock<HashMap<JobId, JobChannel>>>,
    capacity: usize,
    retention: usize,
    seq: Arc<AtomicU64>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl ProgressHub {
    /// Create a hub whose per-job channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            retention: DEFAULT_FINISHED_RETENTION,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Keep at most `retention` finished jobs nobody observes.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a run of `job_id` controlled by `cancel`.
    ///
    /// Returns a subscription that sees every event of the new run. A
    /// finished or aborted job may be registered again; existing observers
    /// stay subscribed to the new run.
    pub fn register(
        &self,
        job_id: &JobId,
        cancel: CancellationToken,
    ) -> Result<Subscription, JobActive> {
        let mut jobs = self.jobs.write();
        let touched = self.next_seq();

        if let Some(channel) = jobs.get_mut(job_id) {
            if channel.is_active() {
                return Err(JobActive(job_id.clone()));
            }
            channel.status = JobStatus::Pending;
            channel.list = None;
            channel.cancel = cancel;
            channel.touched = touched;
            return Ok(Subscription::new(job_id, channel));
        }

        let (sender, _) = broadcast::channel(self.capacity);
        let channel = JobChannel {
            sender,
            status: JobStatus::Pending,
            list: None,
            cancel,
            touched,
        };
        let subscription = Subscription::new(job_id, &channel);
        jobs.insert(job_id.clone(), channel);
        self.prune(&mut jobs);
        Ok(subscription)
    }

    /// Move `job_id` to its terminal `status` and publish the terminal `event`.
    ///
    /// Both happen under one lock, so an observer either receives `event` or
    /// starts from a terminal snapshot.
    pub fn complete(&self, job_id: &JobId, status: JobStatus, event: ProgressEvent) {
        let mut jobs = self.jobs.write();
        let touched = self.next_seq();
        let Some(channel) = jobs.get_mut(job_id) else {
            tracing::debug!(job_id = %job_id, "Dropping terminal event for unregistered job");
            return;
        };

        channel.status = status;
        channel.touched = touched;
        let _ = channel.sender.send(event);
        self.prune(&mut jobs);
    }

    /// Evict the oldest finished, unobserved jobs beyond the retention limit.
    fn prune(&self, jobs: &mut HashMap<JobId, JobChannel>) {
        let mut evictable: Vec<(u64, JobId)> = jobs
            .iter()
            .filter(|(_, channel)| channel.is_evictable())
            .map(|(id, channel)| (channel.touched, id.clone()))
            .collect();
        if evictable.len() <= self.retention {
            return;
        }

        evictable.sort_unstable();
        let excess = evictable.len() - self.retention;
        for (_, job_id) in evictable.into_iter().take(excess) {
            tracing::debug!(job_id = %job_id, "Evicting finished job");
            jobs.remove(&job_id);
        }
    }

    pub fn set_status(&self, job_id: &JobId, status: JobStatus) {
        if let Some(channel) = self.jobs.write().get_mut(job_id) {
            channel.status = status;
        }
    }

    /// Publish `event` to current observers of `job_id`.
    pub fn emit(&self, job_id: &JobId, event: ProgressEvent) {
        let mut jobs = self.jobs.write();
        let Some(channel) = jobs.get_mut(job_id) else {
            tracing::debug!(job_id = %job_id, "Dropping event for unregistered job");
            return;
        };

        if let ProgressEvent::ListFetched { ref name, total } = event {
            channel.list = Some((name.clone(), total));
        }

        // No receivers is fine
        let _ = channel.sender.send(event);
    }

    /// Observe `job_id`. Returns `None` for a job that was never registered.
    pub fn subscribe(&self, job_id: &JobId) -> Option<Subscription> {
        self.jobs
            .read()
            .get(job_id)
            .map(|channel| Subscription::new(job_id, channel))
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.jobs.read().get(job_id).map(|c| c.status)
    }

    /// Cancel a running job. Returns `false` if it is unknown or already over.
    pub fn abort(&self, job_id: &JobId) -> bool {
        let jobs = self.jobs.read();
        match jobs.get(job_id) {
            Some(channel) if channel.is_active() => {
                tracing::info!(job_id = %job_id, "Aborting job");
                channel.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn observer_count(&self, job_id: &JobId) -> usize {
        self.jobs
            .read()
            .get(job_id)
            .map(|c| c.sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop a job's channel, ending every subscription to it.
    ///
    /// Aborted jobs never complete, so their observers wait until this is called.
    pub fn forget(&self, job_id: &JobId) {
        self.jobs.write().remove(job_id);
    }
}

/// One observer's view of a job.
pub struct Subscription {
    job_id: JobId,
    snapshot: Option<ProgressEvent>,
    receiver: broadcast::Receiver<ProgressEvent>,
    done: bool,
}

impl Subscription {
    fn new(job_id: &JobId, channel: &JobChannel) -> Self {
        Self {
            job_id: job_id.clone(),
            snapshot: Some(channel.snapshot(job_id)),
            receiver: channel.sender.subscribe(),
            done: channel.status.is_terminal(),
        }
    }

    /// Next event, or `None` after a terminal event or once the job is forgotten.
    ///
    /// An observer that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        if self.done {
            return None;
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    self.done = event.is_terminal();
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %self.job_id, skipped, "Progress observer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}
