use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    adapter::DecisionModel,
    events::TriggerEvent,
    model::{Connection, ConnectionStatus, DecideStatus, TriggerMode},
    runtime::StatusBoard,
    strategy::{TriggerDecision, TriggerStrategy},
};

const MISSING_VERDICT: &str = "decision model returned no verdict for this connection";

/// `ai-decide` edges: one decision-model call per batch.
///
/// A failed call degrades every edge of the batch to an errored rejection;
/// an edge the model leaves out is rejected.
pub struct AiDecideStrategy {
    board: StatusBoard,
    model: Arc<dyn DecisionModel>,
}

impl AiDecideStrategy {
    pub fn new(
        board: StatusBoard,
        model: Arc<dyn DecisionModel>,
    ) -> Self {
        Self {
            board,
            model,
        }
    }

    fn apply(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        decision: &TriggerDecision,
    ) {
        let id = decision.connection_id.as_str();
        let reason = decision.reason.clone().unwrap_or_default();
        let (status, decide, event) = if decision.approved {
            (
                ConnectionStatus::AiApproved,
                DecideStatus::Approved,
                TriggerEvent::Approved {
                    connection_id: id.to_string(),
                },
            )
        } else if decision.errored {
            (
                ConnectionStatus::AiError,
                DecideStatus::Error,
                TriggerEvent::DecideError {
                    connection_id: id.to_string(),
                    reason,
                },
            )
        } else {
            (
                ConnectionStatus::AiRejected,
                DecideStatus::Rejected,
                TriggerEvent::Rejected {
                    connection_id: id.to_string(),
                    reason,
                },
            )
        };

        self.board.set_decide_status(canvas_id, id, decide, decision.reason.clone());
        if let Some(conn) = self.board.set_status(canvas_id, id, status) {
            self.board.emit(canvas_id, &conn.target_pod_id, event);
        } else {
            debug!("connection {} from {} vanished during decision", id, source_pod_id);
        }
    }
}

#[async_trait]
impl TriggerStrategy for AiDecideStrategy {
    fn mode(&self) -> TriggerMode {
        TriggerMode::AiDecide
    }

    async fn decide(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        edges: &[Connection],
    ) -> Vec<TriggerDecision> {
        if edges.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = edges.iter().map(|e| e.id.clone()).collect();
        for id in &ids {
            self.board.set_decide_status(canvas_id, id, DecideStatus::Pending, None);
            self.board.set_status(canvas_id, id, ConnectionStatus::AiDeciding);
        }
        self.board.emit(
            canvas_id,
            source_pod_id,
            TriggerEvent::DecidePending {
                connection_ids: ids.clone(),
            },
        );

        let decisions = match self.model.decide(canvas_id, source_pod_id, edges).await {
            Ok(verdicts) => {
                let mut verdicts: HashMap<String, TriggerDecision> = verdicts.into_iter().map(|d| (d.connection_id.clone(), d)).collect();
                ids.iter().map(|id| verdicts.remove(id).unwrap_or_else(|| TriggerDecision::reject(id, MISSING_VERDICT))).collect::<Vec<_>>()
            }
            Err(e) => {
                warn!("decision for {} edges of {} failed: {}", ids.len(), source_pod_id, e);
                let reason = e.to_string();
                ids.iter().map(|id| TriggerDecision::error(id, reason.clone())).collect()
            }
        };

        for decision in &decisions {
            self.apply(canvas_id, source_pod_id, decision);
        }
        decisions
    }
}
