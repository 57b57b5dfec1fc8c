//! Event types for trigger orchestration.
//!
//! Events are emitted on every connection state transition, fan-in step,
//! queue movement and delivery so that observers (UI, loggers) can follow
//! the pipeline without coupling to its internals.

mod trigger;

pub use trigger::*;

use crate::model::{CanvasId, PodId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Event message containing canvas and pod context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Canvas the event belongs to.
    pub canvas_id: CanvasId,
    /// Pod the event concerns, the target pod for delivery-side events.
    pub pod_id: PodId,
    /// The actual event data.
    pub event: TriggerEvent,
    /// Timestamp in milliseconds.
    pub timestamp: i64,
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}
