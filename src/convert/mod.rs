//! Playlist conversion pipeline.
//!
//! - [`orchestrator`]: Job state machine ([`Converter`])
//! - [`pool`]: Bounded concurrent resolution
//! - [`reorder`]: Restores source order over completions
//! - [`progress`]: Per-job event channels ([`ProgressHub`])

pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod reorder;

pub use orchestrator::{ConvertOptions, Converter, JobEnd, RunningJob};
pub use progress::{FailureReason, JobActive, MissingTrack, ProgressEvent, ProgressHub, Subscription};
pub use reorder::ReorderBuffer;
