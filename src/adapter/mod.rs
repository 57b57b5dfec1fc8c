//! Narrow collaborator interfaces consumed by the engine.
//!
//! Each trait covers exactly one capability and is handed to the engine at
//! construction time through [`EngineBuilder`](crate::EngineBuilder).

use async_trait::async_trait;

use crate::{
    PodflowError, Result,
    model::{Connection, ConnectionId, PodStatus},
    strategy::TriggerDecision,
};

/// Condensed artifact produced from a source pod's recent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub content: String,
    /// `false` when `content` is raw output used as a fallback.
    pub is_summarized: bool,
}

impl Summary {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_summarized: true,
        }
    }

    pub fn raw(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_summarized: false,
        }
    }
}

/// Everything the execution adapter needs to run one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    pub canvas_id: String,
    pub connection_id: ConnectionId,
    pub target_pod_id: String,
    pub content: String,
    pub is_summarized: bool,
    pub participating_connection_ids: Option<Vec<ConnectionId>>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condenses `source_pod_id`'s recent output, optionally tailored to the target.
    async fn summarize(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
    ) -> Result<Summary>;
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs the agent invocation on the target pod. Only the outcome matters to the engine.
    async fn deliver(
        &self,
        request: DeliveryRequest,
    ) -> Result<()>;
}

#[async_trait]
pub trait DecisionModel: Send + Sync {
    /// Returns one verdict per candidate edge. Omitted edges are treated as rejected.
    async fn decide(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        candidates: &[Connection],
    ) -> Result<Vec<TriggerDecision>>;
}

/// Read and write access to pod state.
pub trait PodAccessor: Send + Sync {
    fn status(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Option<PodStatus>;

    fn set_status(
        &self,
        canvas_id: &str,
        pod_id: &str,
        status: PodStatus,
    );

    /// Human-readable pod name used when merging summaries.
    fn name(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Option<String>;

    /// Most recent raw output, used when summarizing fails.
    fn latest_output(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Option<String>;
}

/// Decision model used when none is configured: every ai-decide edge ends in `error`.
pub(crate) struct NoDecisionModel;

#[async_trait]
impl DecisionModel for NoDecisionModel {
    async fn decide(
        &self,
        _canvas_id: &str,
        _source_pod_id: &str,
        _candidates: &[Connection],
    ) -> Result<Vec<TriggerDecision>> {
        Err(PodflowError::Decision("no decision model configured".to_string()))
    }
}
