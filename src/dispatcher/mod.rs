//! Pipeline orchestration.
//!
//! The [`Pipeline`] runs summarize, decide/collect, queue-check and execute
//! for every triggered edge, and chains propagation to the target's own
//! outgoing edges after a successful delivery.

mod pipeline;

use std::sync::Arc;

use crate::adapter::{Executor, PodAccessor, Summarizer};

pub use pipeline::Pipeline;

/// External services the pipeline drives.
#[derive(Clone)]
pub struct Collaborators {
    pub summarizer: Arc<dyn Summarizer>,
    pub executor: Arc<dyn Executor>,
    pub pods: Arc<dyn PodAccessor>,
}
