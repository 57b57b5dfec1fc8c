use crate::{adapter::Summary, model::PodId};

/// A summary recorded for one source pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source_pod_id: PodId,
    pub content: String,
    pub is_summarized: bool,
}

/// Summaries keyed by source pod, iterated in first-recorded order.
///
/// Re-recording a source overwrites its content in place and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSummaries {
    entries: Vec<SourceSummary>,
}

impl OrderedSummaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `summary` for `source_pod_id`; returns `true` when the source is new.
    pub fn insert(
        &mut self,
        source_pod_id: &str,
        summary: &Summary,
    ) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.source_pod_id == source_pod_id) {
            entry.content = summary.content.clone();
            entry.is_summarized = summary.is_summarized;
            return false;
        }
        self.entries.push(SourceSummary {
            source_pod_id: source_pod_id.to_string(),
            content: summary.content.clone(),
            is_summarized: summary.is_summarized,
        });
        true
    }

    pub fn remove(
        &mut self,
        source_pod_id: &str,
    ) -> Option<SourceSummary> {
        let idx = self.entries.iter().position(|e| e.source_pod_id == source_pod_id)?;
        Some(self.entries.remove(idx))
    }

    pub fn get(
        &self,
        source_pod_id: &str,
    ) -> Option<&SourceSummary> {
        self.entries.iter().find(|e| e.source_pod_id == source_pod_id)
    }

    pub fn contains(
        &self,
        source_pod_id: &str,
    ) -> bool {
        self.get(source_pod_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceSummary> {
        self.entries.iter()
    }

    pub fn source_ids(&self) -> Vec<PodId> {
        self.entries.iter().map(|e| e.source_pod_id.clone()).collect()
    }

    /// `true` when no entry is a raw-output fallback.
    pub fn all_summarized(&self) -> bool {
        self.entries.iter().all(|e| e.is_summarized)
    }
}
