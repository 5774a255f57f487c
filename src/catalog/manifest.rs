//! Source lister backed by a local JSON manifest.
//!
//! ```json
//! {
//!   "name": "Road Trip",
//!   "tracks": [
//!     { "title": "Song A", "artists": ["Artist 1", "Artist 2"] }
//!   ]
//! }
//! ```
//!
//! The source reference is the manifest path. A nameless manifest takes the
//! file stem as its display name.

use std::path::Path;

use serde::Deserialize;

use super::domain::{SourceError, SourceList};
use crate::model::Track;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    tracks: Vec<ManifestTrack>,
}

#[derive(Debug, Deserialize)]
struct ManifestTrack {
    title: String,
    #[serde(default)]
    artists: Vec<String>,
}

/// Reads track lists from JSON manifest files.
#[derive(Debug, Default, Clone)]
pub struct ManifestLister;

impl ManifestLister {
    pub fn new() -> Self {
        Self
    }

    /// Read and parse the manifest at `source_ref`.
    pub async fn read(&self, source_ref: &str) -> Result<SourceList, SourceError> {
        let path = Path::new(source_ref);
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::InvalidReference(format!("{}: no such manifest", path.display()))
            } else {
                SourceError::Unavailable(format!("{}: {}", path.display(), e))
            }
        })?;

        let list = parse(&contents, path)?;
        tracing::info!(
            name = %list.name,
            tracks = list.tracks.len(),
            "Read manifest {:?}",
            path
        );
        Ok(list)
    }
}

fn parse(contents: &str, path: &Path) -> Result<SourceList, SourceError> {
    let manifest: Manifest = serde_json::from_str(contents)
        .map_err(|e| SourceError::InvalidReference(format!("{}: {}", path.display(), e)))?;

    let name = manifest
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Untitled".to_string());

    let tracks = manifest
        .tracks
        .into_iter()
        .enumerate()
        .map(|(i, t)| Track::new(i, t.title.trim(), t.artists))
        .collect();

    Ok(SourceList { name, tracks })
}
