//! Per-target delivery queue.
//!
//! A target pod runs at most one delivery at a time; triggers that find it
//! busy wait here in strict FIFO order until the pipeline drains them.

mod queue;

pub use queue::{EnqueueResult, QueueItem, TargetQueue};
