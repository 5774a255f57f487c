//! Core data models for a conversion job.
//!
//! Defines the primary entities: [`JobId`], [`Track`], [`Outcome`] and [`Job`].
//! A job owns its ordered track list; a track's index is its position in
//! that list and is the join key with checkpoint entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of one conversion run.
///
/// Derived from the source reference so that submitting the same source
/// twice resumes the first run instead of starting over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the job id for a source reference.
    ///
    /// `http(s)` URLs with a `playlist/<id>` path use the alphanumeric id
    /// directly. Anything else (manifest paths, opaque ids) is hashed so the
    /// result is always safe to use as a file name. Callers holding a file
    /// path should pass it through [`canonical_source_ref`] first.
    pub fn from_source_ref(source_ref: &str) -> Self {
        let source_ref = source_ref.trim();

        if let Some(id) = playlist_segment(source_ref) {
            return Self(id);
        }

        let digest = Sha256::digest(source_ref.as_bytes());
        let hex = format!("{:x}", digest);
        Self(hex[..16].to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a source reference before it is turned into a [`JobId`].
///
/// URLs pass through trimmed. Anything else is treated as a file path and
/// made absolute so that two spellings of one manifest share a job, falling
/// back to the trimmed text when the path cannot be resolved.
pub fn canonical_source_ref(source_ref: &str) -> String {
    let source_ref = source_ref.trim();
    if reqwest::Url::parse(source_ref).is_ok_and(|url| url.scheme() != "file" && url.has_host()) {
        return source_ref.to_string();
    }

    match std::fs::canonicalize(source_ref) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::debug!("Could not canonicalize {:?}: {}", source_ref, e);
            source_ref.to_string()
        }
    }
}

/// Extract `<id>` from an `http(s)://host/.../playlist/<id>?...` URL.
fn playlist_segment(source_ref: &str) -> Option<String> {
    let url = reqwest::Url::parse(source_ref).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "playlist")?;
    let id: String = segments
        .next()?
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    (!id.is_empty()).then_some(id)
}

/// One item of the source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Position in the original list
    pub index: usize,
    /// Track title
    pub title: String,
    /// Credited artists, in source order
    pub artists: Vec<String>,
}

impl Track {
    pub fn new(index: usize, title: impl Into<String>, artists: Vec<String>) -> Self {
        Self {
            index,
            title: title.into(),
            artists,
        }
    }

    /// Artists joined for display and query building.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Terminal result of resolving one track against the destination catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    Found {
        #[serde(rename = "externalId")]
        external_id: String,
    },
    Missing,
}

impl Outcome {
    pub fn found(external_id: impl Into<String>) -> Self {
        Self::Found {
            external_id: external_id.into(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn external_id(&self) -> Option<&str> {
        match self {
            Self::Found { external_id } => Some(external_id),
            Self::Missing => None,
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Fetching,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Convert to string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Fetching => "fetching",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory state of one conversion run.
///
/// `resolutions[i]` is `None` while track `i` is unresolved and is set
/// exactly once.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub tracks: Vec<Track>,
    pub status: JobStatus,
    resolutions: Vec<Option<Outcome>>,
}

impl Job {
    pub fn new(id: JobId, name: impl Into<String>, tracks: Vec<Track>) -> Self {
        let resolutions = vec![None; tracks.len()];
        Self {
            id,
            name: name.into(),
            tracks,
            status: JobStatus::Pending,
            resolutions,
        }
    }

    /// Record the outcome for `index`.
    ///
    /// Returns `false` (and leaves the job untouched) if the index is out of
    /// range or already resolved.
    pub fn resolve(&mut self, index: usize, outcome: Outcome) -> bool {
        match self.resolutions.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(outcome);
                true
            }
            _ => false,
        }
    }

    pub fn outcome(&self, index: usize) -> Option<&Outcome> {
        self.resolutions.get(index).and_then(Option::as_ref)
    }

    pub fn is_complete(&self) -> bool {
        self.resolutions.iter().all(Option::is_some)
    }

    /// Indices that have not been resolved yet, ascending.
    pub fn unresolved(&self) -> Vec<usize> {
        self.resolutions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// External ids of found tracks in original order (may contain duplicates).
    pub fn found_ids(&self) -> Vec<String> {
        self.resolutions
            .iter()
            .flatten()
            .filter_map(|o| o.external_id().map(str::to_string))
            .collect()
    }

    /// Tracks whose outcome is `Missing`, in original order.
    pub fn missing_tracks(&self) -> Vec<&Track> {
        self.tracks
            .iter()
            .filter(|t| matches!(self.outcome(t.index), Some(Outcome::Missing)))
            .collect()
    }
}
