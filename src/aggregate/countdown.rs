use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::{sync::oneshot, task::JoinHandle, time::Instant};

use crate::{ShareLock, adapter::Summary, aggregate::OrderedSummaries, model::PodId, strategy::CollectResult};

#[derive(Debug)]
struct WindowTimer {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// Countdown aggregation state of one target pod.
///
/// Holds at most one armed timer and at most one outstanding resolver, the
/// channel through which the first arrival's caller receives the flush result.
#[derive(Debug)]
pub struct DirectPending {
    pub target_pod_id: PodId,
    pub ready_summaries: OrderedSummaries,
    timer: Option<WindowTimer>,
    resolver: Option<oneshot::Sender<CollectResult>>,
}

impl DirectPending {
    fn new(target_pod_id: &str) -> Self {
        Self {
            target_pod_id: target_pod_id.to_string(),
            ready_summaries: OrderedSummaries::new(),
            timer: None,
            resolver: None,
        }
    }

    /// Hands `result` to the waiting caller; `false` when nobody is waiting.
    pub fn resolve(
        &mut self,
        result: CollectResult,
    ) -> bool {
        match self.resolver.take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

/// Fan-in without a fixed source count: the window opens on the first
/// arrival and is extended by every later one.
#[derive(Default)]
pub struct CountdownAggregator {
    pending: ShareLock<HashMap<PodId, DirectPending>>,
}

impl CountdownAggregator {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn initialize(
        &self,
        target_pod_id: &str,
    ) {
        let mut pending = self.pending.write().unwrap();
        pending.entry(target_pod_id.to_string()).or_insert_with(|| DirectPending::new(target_pod_id));
    }

    pub fn is_pending(
        &self,
        target_pod_id: &str,
    ) -> bool {
        self.pending.read().unwrap().contains_key(target_pod_id)
    }

    /// Records a ready source and returns how many sources are ready.
    pub fn record_ready(
        &self,
        target_pod_id: &str,
        source_pod_id: &str,
        summary: &Summary,
    ) -> usize {
        let mut pending = self.pending.write().unwrap();
        let target = pending.entry(target_pod_id.to_string()).or_insert_with(|| DirectPending::new(target_pod_id));
        target.ready_summaries.insert(source_pod_id, summary);
        target.ready_summaries.len()
    }

    pub fn ready_summaries(
        &self,
        target_pod_id: &str,
    ) -> Option<OrderedSummaries> {
        self.pending.read().unwrap().get(target_pod_id).map(|t| t.ready_summaries.clone())
    }

    pub fn has_active_timer(
        &self,
        target_pod_id: &str,
    ) -> bool {
        self.pending.read().unwrap().get(target_pod_id).is_some_and(|t| t.timer.as_ref().is_some_and(|timer| !timer.handle.is_finished()))
    }

    /// Installs the window timer, aborting the one it replaces.
    ///
    /// The handle is aborted right away when no aggregation is open.
    pub fn set_timer(
        &self,
        target_pod_id: &str,
        handle: JoinHandle<()>,
        deadline: Instant,
    ) -> bool {
        let mut pending = self.pending.write().unwrap();
        let Some(target) = pending.get_mut(target_pod_id) else {
            handle.abort();
            return false;
        };
        target.abort_timer();
        target.timer = Some(WindowTimer {
            handle,
            deadline,
        });
        true
    }

    pub fn timer_deadline(
        &self,
        target_pod_id: &str,
    ) -> Option<Instant> {
        self.pending.read().unwrap().get(target_pod_id).and_then(|t| t.timer.as_ref().map(|timer| timer.deadline))
    }

    pub fn clear_timer(
        &self,
        target_pod_id: &str,
    ) {
        if let Some(target) = self.pending.write().unwrap().get_mut(target_pod_id) {
            target.abort_timer();
        }
    }

    /// Registers the caller waiting for the flush. Only one caller may wait
    /// per aggregation: returns `false` when one already does.
    pub fn set_resolver(
        &self,
        target_pod_id: &str,
        resolver: oneshot::Sender<CollectResult>,
    ) -> bool {
        let mut pending = self.pending.write().unwrap();
        match pending.get_mut(target_pod_id) {
            Some(target) if target.resolver.is_none() => {
                target.resolver = Some(resolver);
                true
            }
            _ => false,
        }
    }

    pub fn has_resolver(
        &self,
        target_pod_id: &str,
    ) -> bool {
        self.pending.read().unwrap().get(target_pod_id).is_some_and(|t| t.resolver.is_some())
    }

    /// Removes the aggregation without touching its timer task, used by the
    /// timer itself when the window closes.
    pub fn take(
        &self,
        target_pod_id: &str,
    ) -> Option<DirectPending> {
        self.pending.write().unwrap().remove(target_pod_id)
    }

    /// Drops one source; returns how many sources remain ready.
    pub fn remove_source(
        &self,
        target_pod_id: &str,
        source_pod_id: &str,
    ) -> Option<usize> {
        let mut pending = self.pending.write().unwrap();
        let target = pending.get_mut(target_pod_id)?;
        target.ready_summaries.remove(source_pod_id);
        Some(target.ready_summaries.len())
    }

    /// Aborts the window and resolves any waiting caller with "not ready".
    pub fn cancel(
        &self,
        target_pod_id: &str,
    ) -> bool {
        let Some(mut target) = self.pending.write().unwrap().remove(target_pod_id) else {
            return false;
        };
        target.abort_timer();
        target.resolve(CollectResult::not_ready());
        true
    }

    /// Drops the aggregation; a waiting caller observes a closed channel.
    pub fn clear(
        &self,
        target_pod_id: &str,
    ) {
        if let Some(mut target) = self.pending.write().unwrap().remove(target_pod_id) {
            target.abort_timer();
        }
    }
}
