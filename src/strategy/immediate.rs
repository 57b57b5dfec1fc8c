use async_trait::async_trait;
use tracing::trace;

use crate::{
    model::{Connection, TriggerMode},
    strategy::{TriggerDecision, TriggerStrategy},
};

/// `auto` edges: every edge fires unconditionally.
#[derive(Debug, Default, Clone)]
pub struct ImmediateStrategy;

impl ImmediateStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TriggerStrategy for ImmediateStrategy {
    fn mode(&self) -> TriggerMode {
        TriggerMode::Auto
    }

    async fn decide(
        &self,
        _canvas_id: &str,
        source_pod_id: &str,
        edges: &[Connection],
    ) -> Vec<TriggerDecision> {
        trace!("immediate::decide({}, {} edges)", source_pod_id, edges.len());
        edges.iter().map(|e| TriggerDecision::approve(&e.id)).collect()
    }
}
