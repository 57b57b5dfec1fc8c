use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use tracing::{debug, warn};

use crate::{ShareLock, adapter::Summary, aggregate::OrderedSummaries, model::PodId};

/// Readiness of a fixed-set aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanInStatus {
    /// Every required source completed or was rejected.
    pub all_responded: bool,
    /// At least one source was rejected.
    pub has_rejection: bool,
}

/// Aggregation state of one target pod.
///
/// `completed_sources` and `rejected_sources` never share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTarget {
    pub target_pod_id: PodId,
    pub required_source_pod_ids: HashSet<PodId>,
    pub completed_sources: OrderedSummaries,
    pub rejected_sources: HashMap<PodId, String>,
}

impl PendingTarget {
    fn new(
        target_pod_id: &str,
        required: HashSet<PodId>,
    ) -> Self {
        Self {
            target_pod_id: target_pod_id.to_string(),
            required_source_pod_ids: required,
            completed_sources: OrderedSummaries::new(),
            rejected_sources: HashMap::new(),
        }
    }

    pub fn responded(&self) -> usize {
        self.completed_sources.len() + self.rejected_sources.len()
    }

    pub fn status(&self) -> FanInStatus {
        FanInStatus {
            all_responded: self.responded() >= self.required_source_pod_ids.len(),
            has_rejection: !self.rejected_sources.is_empty(),
        }
    }

    fn adopt(
        &mut self,
        source_pod_id: &str,
    ) {
        // an edge created after the aggregation opened still has to be waited for
        if self.required_source_pod_ids.insert(source_pod_id.to_string()) {
            debug!("fan-in for {} adopted late source {}", self.target_pod_id, source_pod_id);
        }
    }
}

/// Fan-in keyed by a statically known set of required upstream pods.
#[derive(Default)]
pub struct FixedSetAggregator {
    pending: ShareLock<HashMap<PodId, PendingTarget>>,
}

impl FixedSetAggregator {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens an aggregation for `target_pod_id`; no-op when one is already open.
    pub fn initialize(
        &self,
        target_pod_id: &str,
        required_source_pod_ids: impl IntoIterator<Item = PodId>,
    ) {
        let mut pending = self.pending.write().unwrap();
        if pending.contains_key(target_pod_id) {
            return;
        }
        let required = required_source_pod_ids.into_iter().collect();
        pending.insert(target_pod_id.to_string(), PendingTarget::new(target_pod_id, required));
    }

    pub fn is_pending(
        &self,
        target_pod_id: &str,
    ) -> bool {
        self.pending.read().unwrap().contains_key(target_pod_id)
    }

    pub fn record_completion(
        &self,
        target_pod_id: &str,
        source_pod_id: &str,
        summary: &Summary,
    ) -> FanInStatus {
        let mut pending = self.pending.write().unwrap();
        let Some(target) = pending.get_mut(target_pod_id) else {
            warn!("completion from {} for {} without an open fan-in", source_pod_id, target_pod_id);
            return FanInStatus::default();
        };
        target.adopt(source_pod_id);
        target.rejected_sources.remove(source_pod_id);
        target.completed_sources.insert(source_pod_id, summary);
        target.status()
    }

    pub fn record_rejection(
        &self,
        target_pod_id: &str,
        source_pod_id: &str,
        reason: &str,
    ) -> FanInStatus {
        let mut pending = self.pending.write().unwrap();
        let Some(target) = pending.get_mut(target_pod_id) else {
            warn!("rejection from {} for {} without an open fan-in", source_pod_id, target_pod_id);
            return FanInStatus::default();
        };
        target.adopt(source_pod_id);
        target.completed_sources.remove(source_pod_id);
        target.rejected_sources.insert(source_pod_id.to_string(), reason.to_string());
        target.status()
    }

    pub fn status(
        &self,
        target_pod_id: &str,
    ) -> Option<FanInStatus> {
        self.pending.read().unwrap().get(target_pod_id).map(|t| t.status())
    }

    pub fn get(
        &self,
        target_pod_id: &str,
    ) -> Option<PendingTarget> {
        self.pending.read().unwrap().get(target_pod_id).cloned()
    }

    pub fn completed_summaries(
        &self,
        target_pod_id: &str,
    ) -> Option<OrderedSummaries> {
        self.pending.read().unwrap().get(target_pod_id).map(|t| t.completed_sources.clone())
    }

    /// Removes and returns the aggregation of `target_pod_id`.
    pub fn take(
        &self,
        target_pod_id: &str,
    ) -> Option<PendingTarget> {
        self.pending.write().unwrap().remove(target_pod_id)
    }

    pub fn clear(
        &self,
        target_pod_id: &str,
    ) {
        self.pending.write().unwrap().remove(target_pod_id);
    }

    /// Drops `source_pod_id` from the aggregation of `target_pod_id`.
    ///
    /// Clears the aggregation and returns `None` when the required set becomes
    /// empty, otherwise returns the re-checked status.
    pub fn remove_source(
        &self,
        target_pod_id: &str,
        source_pod_id: &str,
    ) -> Option<FanInStatus> {
        let mut pending = self.pending.write().unwrap();
        let target = pending.get_mut(target_pod_id)?;
        target.required_source_pod_ids.remove(source_pod_id);
        target.completed_sources.remove(source_pod_id);
        target.rejected_sources.remove(source_pod_id);

        if target.required_source_pod_ids.is_empty() {
            pending.remove(target_pod_id);
            return None;
        }
        Some(target.status())
    }

    /// Targets whose required set includes `source_pod_id`.
    pub fn targets_with_source(
        &self,
        source_pod_id: &str,
    ) -> Vec<PodId> {
        let pending = self.pending.read().unwrap();
        pending.values().filter(|t| t.required_source_pod_ids.contains(source_pod_id)).map(|t| t.target_pod_id.clone()).collect()
    }
}
