//! Fan-in aggregation.
//!
//! Two aggregators collect concurrent upstream completions destined for the
//! same downstream pod:
//! - [`FixedSetAggregator`]: waits for a statically known set of sources
//! - [`CountdownAggregator`]: batches arrivals inside a rolling time window

mod countdown;
mod fixed;
mod merge;
mod summaries;

pub use countdown::{CountdownAggregator, DirectPending};
pub use fixed::{FanInStatus, FixedSetAggregator, PendingTarget};
pub use merge::{MERGE_DELIMITER, PREVIEW_CHARS, combine, merge_summaries, preview};
pub use summaries::{OrderedSummaries, SourceSummary};
