use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{
    ShareLock,
    model::{CanvasId, ConnectionId, PodId, TriggerMode},
    utils,
};

/// A delivery waiting for its target pod to become idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: String,
    pub canvas_id: CanvasId,
    pub connection_id: ConnectionId,
    pub source_pod_id: PodId,
    pub target_pod_id: PodId,
    pub summary: String,
    pub is_summarized: bool,
    pub trigger_mode: TriggerMode,
    pub participating_connection_ids: Option<Vec<ConnectionId>>,
    pub enqueued_at: i64,
}

impl QueueItem {
    pub fn new(
        canvas_id: &str,
        connection_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
        summary: String,
        is_summarized: bool,
        trigger_mode: TriggerMode,
    ) -> Self {
        Self {
            id: utils::longid(),
            canvas_id: canvas_id.to_string(),
            connection_id: connection_id.to_string(),
            source_pod_id: source_pod_id.to_string(),
            target_pod_id: target_pod_id.to_string(),
            summary,
            is_summarized,
            trigger_mode,
            participating_connection_ids: None,
            enqueued_at: utils::time::time_millis(),
        }
    }

    pub fn with_participants(
        mut self,
        participating_connection_ids: Option<Vec<ConnectionId>>,
    ) -> Self {
        self.participating_connection_ids = participating_connection_ids;
        self
    }

    /// Connections this delivery stands for: the merged group, or its own edge.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        match &self.participating_connection_ids {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => vec![self.connection_id.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueResult {
    /// 1-based position of the new item.
    pub position: usize,
    pub queue_size: usize,
}

/// FIFO queues keyed by target pod. A target with no waiting item has no entry.
#[derive(Default)]
pub struct TargetQueue {
    queues: ShareLock<HashMap<PodId, VecDeque<QueueItem>>>,
}

impl TargetQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn enqueue(
        &self,
        item: QueueItem,
    ) -> EnqueueResult {
        trace!("target_queue::enqueue({}, {})", item.target_pod_id, item.connection_id);
        let mut queues = self.queues.write().unwrap();
        let queue = queues.entry(item.target_pod_id.clone()).or_default();
        queue.push_back(item);
        EnqueueResult {
            position: queue.len(),
            queue_size: queue.len(),
        }
    }

    pub fn dequeue(
        &self,
        target_pod_id: &str,
    ) -> Option<QueueItem> {
        let mut queues = self.queues.write().unwrap();
        let queue = queues.get_mut(target_pod_id)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            queues.remove(target_pod_id);
        }
        item
    }

    pub fn peek(
        &self,
        target_pod_id: &str,
    ) -> Option<QueueItem> {
        self.queues.read().unwrap().get(target_pod_id).and_then(|q| q.front().cloned())
    }

    pub fn size(
        &self,
        target_pod_id: &str,
    ) -> usize {
        self.queues.read().unwrap().get(target_pod_id).map_or(0, |q| q.len())
    }

    pub fn clear(
        &self,
        target_pod_id: &str,
    ) -> usize {
        self.queues.write().unwrap().remove(target_pod_id).map_or(0, |q| q.len())
    }

    /// Drops every item delivered on behalf of `connection_id`.
    pub fn remove_by_connection(
        &self,
        connection_id: &str,
    ) -> usize {
        let mut queues = self.queues.write().unwrap();
        let mut removed = 0;
        for queue in queues.values_mut() {
            let before = queue.len();
            queue.retain(|item| item.connection_id != connection_id);
            removed += before - queue.len();
        }
        queues.retain(|_, q| !q.is_empty());
        removed
    }

    /// Drops every item sent by or waiting for `pod_id`.
    pub fn remove_by_pod(
        &self,
        pod_id: &str,
    ) -> usize {
        let mut queues = self.queues.write().unwrap();
        let mut removed = queues.remove(pod_id).map_or(0, |q| q.len());
        for queue in queues.values_mut() {
            let before = queue.len();
            queue.retain(|item| item.source_pod_id != pod_id);
            removed += before - queue.len();
        }
        queues.retain(|_, q| !q.is_empty());
        removed
    }

    /// Targets with at least one waiting item.
    pub fn targets(&self) -> Vec<PodId> {
        self.queues.read().unwrap().keys().cloned().collect()
    }
}
