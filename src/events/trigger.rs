use crate::model::{ConnectionId, ConnectionStatus, PodId};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    /// A connection moved to a new runtime status.
    StatusChanged {
        connection_id: ConnectionId,
        status: ConnectionStatus,
    },
    /// A batch of edges was handed to the decision model.
    DecidePending {
        connection_ids: Vec<ConnectionId>,
    },
    Approved {
        connection_id: ConnectionId,
    },
    Rejected {
        connection_id: ConnectionId,
        reason: String,
    },
    DecideError {
        connection_id: ConnectionId,
        reason: String,
    },
    /// A source arrived at a fan-in aggregation that is not complete yet.
    /// `total` is unknown for countdown windows.
    Waiting {
        connection_id: ConnectionId,
        source_pod_id: PodId,
        ready: usize,
        total: Option<usize>,
    },
    /// Several sources were merged into one delivery.
    Merged {
        source_pod_ids: Vec<PodId>,
        participating_connection_ids: Vec<ConnectionId>,
        preview: String,
    },
    /// Every required source answered but at least one was rejected.
    NotTriggered {
        rejected: Vec<(PodId, String)>,
    },
    Queued {
        connection_id: ConnectionId,
        position: usize,
        queue_size: usize,
    },
    Dequeued {
        connection_id: ConnectionId,
        remaining: usize,
    },
    Triggered {
        connection_id: ConnectionId,
        participating_connection_ids: Vec<ConnectionId>,
        is_summarized: bool,
    },
    Complete {
        connection_id: ConnectionId,
        success: bool,
        error: Option<String>,
    },
}

impl TriggerEvent {
    pub fn str(&self) -> &str {
        match self {
            TriggerEvent::StatusChanged { .. } => "StatusChanged",
            TriggerEvent::DecidePending { .. } => "DecidePending",
            TriggerEvent::Approved { .. } => "Approved",
            TriggerEvent::Rejected { .. } => "Rejected",
            TriggerEvent::DecideError { .. } => "DecideError",
            TriggerEvent::Waiting { .. } => "Waiting",
            TriggerEvent::Merged { .. } => "Merged",
            TriggerEvent::NotTriggered { .. } => "NotTriggered",
            TriggerEvent::Queued { .. } => "Queued",
            TriggerEvent::Dequeued { .. } => "Dequeued",
            TriggerEvent::Triggered { .. } => "Triggered",
            TriggerEvent::Complete { .. } => "Complete",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, TriggerEvent::Complete { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TriggerEvent::DecideError { .. }
                | TriggerEvent::Complete {
                    success: false,
                    ..
                }
        )
    }
}
