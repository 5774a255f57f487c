//! Two-stage track matcher.
//!
//! 1. Search restricted to songs.
//! 2. If that finds nothing, search across all entity types.
//!
//! The first candidate of whichever stage answers wins; ranking inside a
//! stage belongs to the catalog. Transient failures are retried per stage
//! under the configured [`RetryPolicy`]. A stage that is still unavailable
//! after its budget counts as "no candidate", so an exhausted track ends up
//! `Missing` rather than failing the job. Credential errors are returned.

use std::sync::Arc;

use crate::catalog::domain::{Candidate, CatalogError};
use crate::catalog::retry::{RetryPolicy, retry_transient};
use crate::catalog::traits::CatalogSearch;
use crate::model::{Outcome, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Songs,
    Any,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Songs => "songs search",
            Stage::Any => "unfiltered search",
        }
    }
}

/// Resolves single tracks against the destination catalog.
#[derive(Clone)]
pub struct Matcher {
    catalog: Arc<dyn CatalogSearch>,
    retry: RetryPolicy,
}

impl Matcher {
    pub fn new(catalog: Arc<dyn CatalogSearch>, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    /// Resolve one track to `Found` or `Missing`.
    ///
    /// # Errors
    ///
    /// Only non-retryable catalog errors (rejected credentials) are returned.
    pub async fn resolve(&self, track: &Track) -> Result<Outcome, CatalogError> {
        for stage in [Stage::Songs, Stage::Any] {
            match self.run_stage(stage, track).await {
                Ok(Some(candidate)) => {
                    tracing::debug!(
                        index = track.index,
                        stage = stage.as_str(),
                        external_id = %candidate.external_id,
                        result_type = candidate.result_type.as_deref().unwrap_or("unknown"),
                        "Track matched"
                    );
                    return Ok(Outcome::found(candidate.external_id));
                }
                Ok(None) => {}
                Err(err @ CatalogError::Unavailable(_)) => {
                    tracing::warn!(
                        index = track.index,
                        title = %track.title,
                        stage = stage.as_str(),
                        error = %err,
                        "Catalog stage unavailable after retries"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(index = track.index, title = %track.title, "No match");
        Ok(Outcome::Missing)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        track: &Track,
    ) -> Result<Option<Candidate>, CatalogError> {
        let catalog = self.catalog.as_ref();
        retry_transient(&self.retry, stage.as_str(), move || async move {
            match stage {
                Stage::Songs => catalog.search_songs(&track.title, &track.artists).await,
                Stage::Any => catalog.search_any(&track.title, &track.artists).await,
            }
        })
        .await
    }
}
