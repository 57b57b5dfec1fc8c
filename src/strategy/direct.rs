use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{runtime::Handle, sync::oneshot, time::Instant};
use tracing::{debug, trace, warn};

use crate::{
    adapter::{PodAccessor, Summary},
    aggregate::{CountdownAggregator, combine, preview},
    events::TriggerEvent,
    model::{Connection, ConnectionId, ConnectionStatus, TriggerMode},
    runtime::StatusBoard,
    strategy::{CollectResult, TriggerDecision, TriggerStrategy},
};

/// `direct` edges: always approved; concurrent arrivals for a target with
/// several direct inbound edges are batched by a countdown window.
///
/// The first arrival of a window owns its resolution and waits for the
/// flush. Later arrivals record their summary, push the deadline back and
/// return "not ready" at once.
#[derive(Clone)]
pub struct DirectStrategy {
    board: StatusBoard,
    countdown: Arc<CountdownAggregator>,
    pods: Arc<dyn PodAccessor>,
    runtime: Handle,
    window: Duration,
    safety_timeout: Duration,
}

impl DirectStrategy {
    pub fn new(
        board: StatusBoard,
        countdown: Arc<CountdownAggregator>,
        pods: Arc<dyn PodAccessor>,
        runtime: Handle,
        window: Duration,
        safety_timeout: Duration,
    ) -> Self {
        Self {
            board,
            countdown,
            pods,
            runtime,
            window,
            safety_timeout,
        }
    }

    /// Latest instant the first caller keeps waiting for the flush: the
    /// safety timeout counted from the most recent arrival.
    fn ceiling(
        &self,
        target_pod_id: &str,
    ) -> Option<Instant> {
        let deadline = self.countdown.timer_deadline(target_pod_id)?;
        Some(deadline - self.window + self.safety_timeout)
    }

    /// Arms the window of `target_pod_id`, replacing any running timer.
    fn arm_window(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) {
        let deadline = Instant::now() + self.window;
        let this = self.clone();
        let canvas = canvas_id.to_string();
        let target = target_pod_id.to_string();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            this.flush(&canvas, &target);
        });
        self.countdown.set_timer(target_pod_id, handle, deadline);
    }

    /// Closes the window and hands the batch to the waiting caller.
    fn flush(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) {
        let Some(mut pending) = self.countdown.take(target_pod_id) else {
            return;
        };
        let summaries = pending.ready_summaries.clone();
        let participating: Vec<ConnectionId> = summaries
            .iter()
            .filter_map(|s| self.board.connections().find_edge(canvas_id, &s.source_pod_id, target_pod_id))
            .map(|c| c.id)
            .collect();

        let result = match combine(&summaries, |id| self.pods.name(canvas_id, id)) {
            None => CollectResult::not_ready(),
            Some((content, is_summarized)) => {
                if summaries.len() > 1 {
                    self.board.emit(
                        canvas_id,
                        target_pod_id,
                        TriggerEvent::Merged {
                            source_pod_ids: summaries.source_ids(),
                            participating_connection_ids: participating.clone(),
                            preview: preview(&content),
                        },
                    );
                }
                CollectResult::ready(content, is_summarized, Some(participating.clone()))
            }
        };

        debug!("countdown window for {} closed with {} sources", target_pod_id, summaries.len());
        if !pending.resolve(result) {
            warn!("countdown window for {} closed with no caller waiting", target_pod_id);
            self.board.set_all(canvas_id, &participating, ConnectionStatus::Idle);
        }
    }

    fn abandon(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) {
        let stale = self.countdown.ready_summaries(target_pod_id).map(|s| s.source_ids()).unwrap_or_default();
        self.countdown.clear(target_pod_id);
        for source in stale {
            if let Some(conn) = self.board.connections().find_edge(canvas_id, &source, target_pod_id) {
                self.board.set_status(canvas_id, &conn.id, ConnectionStatus::Idle);
            }
        }
    }
}

#[async_trait]
impl TriggerStrategy for DirectStrategy {
    fn mode(&self) -> TriggerMode {
        TriggerMode::Direct
    }

    async fn decide(
        &self,
        _canvas_id: &str,
        source_pod_id: &str,
        edges: &[Connection],
    ) -> Vec<TriggerDecision> {
        trace!("direct::decide({}, {} edges)", source_pod_id, edges.len());
        edges.iter().map(|e| TriggerDecision::approve(&e.id)).collect()
    }

    async fn collect_sources(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        edge: &Connection,
        summary: &Summary,
    ) -> Option<CollectResult> {
        let target = edge.target_pod_id.as_str();
        let inbound = self.board.connections().find_by_target(canvas_id, target).into_iter().filter(|c| c.trigger_mode == TriggerMode::Direct).count();
        if inbound <= 1 && !self.countdown.is_pending(target) {
            return Some(CollectResult::single(summary));
        }

        let ready = self.countdown.record_ready(target, source_pod_id, summary);
        self.board.set_status(canvas_id, &edge.id, ConnectionStatus::Waiting);
        self.board.emit(
            canvas_id,
            target,
            TriggerEvent::Waiting {
                connection_id: edge.id.clone(),
                source_pod_id: source_pod_id.to_string(),
                ready,
                total: None,
            },
        );

        let (tx, mut rx) = oneshot::channel();
        let owner = self.countdown.set_resolver(target, tx);
        self.arm_window(canvas_id, target);
        if !owner {
            debug!("countdown window for {} extended by {}", target, source_pod_id);
            return Some(CollectResult::not_ready());
        }

        loop {
            // no timer left: the flush already ran or the window is gone
            let ceiling = self.ceiling(target).unwrap_or_else(Instant::now);
            match tokio::time::timeout_at(ceiling, &mut rx).await {
                Ok(Ok(result)) => return Some(result),
                // cleared or cancelled
                Ok(Err(_)) => return Some(CollectResult::not_ready()),
                // a later arrival moved the deadline
                Err(_) if self.ceiling(target).is_some_and(|c| c > Instant::now()) => continue,
                Err(_) => {
                    if let Ok(result) = rx.try_recv() {
                        return Some(result);
                    }
                    warn!("countdown window for {} did not close within {:?} of its last arrival, dropping it", target, self.safety_timeout);
                    self.abandon(canvas_id, target);
                    return Some(CollectResult::not_ready());
                }
            }
        }
    }
}
