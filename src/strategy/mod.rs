//! Trigger strategies.
//!
//! Every trigger mode is served by one [`TriggerStrategy`]: `decide` approves
//! or rejects a batch of outgoing edges, and `collect_sources` optionally
//! takes over fan-in for an approved edge.

mod ai_decide;
mod direct;
mod immediate;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    adapter::Summary,
    model::{Connection, ConnectionId, TriggerMode},
};

pub use ai_decide::AiDecideStrategy;
pub use direct::DirectStrategy;
pub use immediate::ImmediateStrategy;

/// Verdict for one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub connection_id: ConnectionId,
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// The verdict is a degraded one produced by a failed decision.
    #[serde(default)]
    pub errored: bool,
}

impl TriggerDecision {
    pub fn approve(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            approved: true,
            reason: None,
            errored: false,
        }
    }

    pub fn reject(
        connection_id: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            approved: false,
            reason: Some(reason.into()),
            errored: false,
        }
    }

    pub fn error(
        connection_id: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            approved: false,
            reason: Some(reason.into()),
            errored: true,
        }
    }
}

/// Outcome of the fan-in stage for one edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectResult {
    /// Delivery may proceed now.
    pub ready: bool,
    /// Content to deliver, merged when several sources took part.
    pub merged_content: Option<String>,
    pub is_summarized: Option<bool>,
    pub participating_connection_ids: Option<Vec<ConnectionId>>,
}

impl CollectResult {
    pub fn not_ready() -> Self {
        Self::default()
    }

    pub fn ready(
        content: String,
        is_summarized: bool,
        participating_connection_ids: Option<Vec<ConnectionId>>,
    ) -> Self {
        Self {
            ready: true,
            merged_content: Some(content),
            is_summarized: Some(is_summarized),
            participating_connection_ids,
        }
    }

    /// Ready with the edge's own summary, no aggregation involved.
    pub fn single(summary: &Summary) -> Self {
        Self::ready(summary.content.clone(), summary.is_summarized, None)
    }
}

#[async_trait]
pub trait TriggerStrategy: Send + Sync {
    /// The trigger mode served by this strategy.
    fn mode(&self) -> TriggerMode;

    /// Approves or rejects each of `edges`; returns one decision per edge.
    async fn decide(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        edges: &[Connection],
    ) -> Vec<TriggerDecision>;

    /// Fan-in hook. `None` lets the pipeline fall back to fixed-set fan-in.
    async fn collect_sources(
        &self,
        _canvas_id: &str,
        _source_pod_id: &str,
        _edge: &Connection,
        _summary: &Summary,
    ) -> Option<CollectResult> {
        None
    }
}

/// Strategies keyed by the trigger mode they serve.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<TriggerMode, Arc<dyn TriggerStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `strategy` under its own mode, replacing any previous one.
    pub fn register(
        &mut self,
        strategy: Arc<dyn TriggerStrategy>,
    ) {
        self.strategies.insert(strategy.mode(), strategy);
    }

    pub fn get(
        &self,
        mode: TriggerMode,
    ) -> Option<Arc<dyn TriggerStrategy>> {
        self.strategies.get(&mode).cloned()
    }
}
