//! Bounded concurrent track resolution.
//!
//! Tracks are submitted lazily: a new resolution starts only when a slot
//! frees up, and only if the cancellation token has not fired. Results come
//! back in completion order. One failing resolution never affects its
//! siblings.

use std::future::Future;

use futures::{Stream, StreamExt, future, stream};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogError;
use crate::model::{Outcome, Track};

/// Result of one resolution, tagged with the track index
pub type Resolution = (usize, Result<Outcome, CatalogError>);

/// Resolve `tracks` with at most `max_concurrent` in flight.
///
/// # Arguments
/// * `tracks` - Tracks to resolve, each submitted exactly once
/// * `resolve` - Resolution for a single track
/// * `max_concurrent` - In-flight limit (values below 1 are treated as 1)
/// * `cancel` - Stops new submissions; in-flight resolutions still finish
///   and are yielded
pub fn run_all<F, Fut>(
    tracks: Vec<Track>,
    resolve: F,
    max_concurrent: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = Resolution>
where
    F: Fn(Track) -> Fut,
    Fut: Future<Output = Result<Outcome, CatalogError>>,
{
    stream::iter(tracks)
        .take_while(move |_| future::ready(!cancel.is_cancelled()))
        .map(move |track| {
            let index = track.index;
            let resolution = resolve(track);
            async move { (index, resolution.await) }
        })
        .buffer_unordered(max_concurrent.max(1))
}
