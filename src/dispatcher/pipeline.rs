use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::{
    adapter::{DeliveryRequest, Summary},
    aggregate::{CountdownAggregator, FixedSetAggregator, combine, preview},
    delivery::{QueueItem, TargetQueue},
    dispatcher::Collaborators,
    events::TriggerEvent,
    model::{Connection, ConnectionId, ConnectionStatus, PodId, PodStatus, TriggerMode},
    runtime::StatusBoard,
    strategy::{CollectResult, StrategyRegistry, TriggerDecision, TriggerStrategy},
};

/// Modes in the order their batches are decided.
const MODES: [TriggerMode; 3] = [TriggerMode::Auto, TriggerMode::Direct, TriggerMode::AiDecide];

enum Claim {
    Claimed,
    Busy,
    Missing,
}

/// Per-edge trigger pipeline.
///
/// All shared state sits behind short critical sections that never span an
/// `.await`. Work that must outlive the caller (edge pipelines, queue drains,
/// propagation) is spawned on the runtime handle.
pub struct Pipeline {
    board: StatusBoard,
    strategies: StrategyRegistry,
    fixed: Arc<FixedSetAggregator>,
    countdown: Arc<CountdownAggregator>,
    queue: Arc<TargetQueue>,
    collaborators: Collaborators,
    runtime: Handle,
    /// Serializes "target idle?" with "mark target chatting".
    claim: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        board: StatusBoard,
        strategies: StrategyRegistry,
        countdown: Arc<CountdownAggregator>,
        collaborators: Collaborators,
        runtime: Handle,
    ) -> Self {
        Self {
            board,
            strategies,
            fixed: Arc::new(FixedSetAggregator::new()),
            countdown,
            queue: Arc::new(TargetQueue::new()),
            collaborators,
            runtime,
            claim: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<TargetQueue> {
        &self.queue
    }

    pub fn fixed(&self) -> &Arc<FixedSetAggregator> {
        &self.fixed
    }

    pub fn countdown(&self) -> &Arc<CountdownAggregator> {
        &self.countdown
    }

    /// Entry point for a pod that finished producing output: decides every
    /// outgoing edge, grouped by trigger mode, and starts the approved ones.
    pub async fn on_source_complete(
        self: &Arc<Self>,
        canvas_id: &str,
        source_pod_id: &str,
    ) {
        let outgoing = self.board.connections().find_by_source(canvas_id, source_pod_id);
        if outgoing.is_empty() {
            trace!("pipeline: {} has no outgoing connections", source_pod_id);
            return;
        }

        for mode in MODES {
            let edges: Vec<Connection> = outgoing.iter().filter(|c| c.trigger_mode == mode).cloned().collect();
            if edges.is_empty() {
                continue;
            }
            let Some(strategy) = self.strategies.get(mode) else {
                warn!("no strategy registered for {} edges of {}", mode.as_ref(), source_pod_id);
                continue;
            };

            let decisions = strategy.decide(canvas_id, source_pod_id, &edges).await;
            for decision in decisions {
                let Some(edge) = edges.iter().find(|e| e.id == decision.connection_id) else {
                    debug!("decision for unknown connection {} ignored", decision.connection_id);
                    continue;
                };
                if decision.approved {
                    self.spawn_edge(canvas_id, source_pod_id, edge.clone(), strategy.clone());
                } else {
                    self.handle_rejection(canvas_id, source_pod_id, edge, &decision);
                }
            }
        }
    }

    /// Fire-and-forget variant of [`Pipeline::on_source_complete`].
    pub fn spawn_source_complete(
        self: &Arc<Self>,
        canvas_id: &str,
        source_pod_id: &str,
    ) {
        let this = self.clone();
        let canvas = canvas_id.to_string();
        let source = source_pod_id.to_string();
        let fut: BoxFuture<'static, ()> = Box::pin(async move { this.on_source_complete(&canvas, &source).await });
        self.runtime.spawn(fut);
    }

    /// Dequeues and executes one item for `target_pod_id`, only when the
    /// target is idle. Returns whether a delivery was started.
    pub fn process_next_in_queue(
        self: &Arc<Self>,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> bool {
        loop {
            if self.queue.size(target_pod_id) == 0 {
                return false;
            }
            if !matches!(self.try_claim(canvas_id, target_pod_id), Claim::Claimed) {
                return false;
            }
            if let Some(item) = self.queue.dequeue(target_pod_id) {
                self.board.emit(
                    canvas_id,
                    target_pod_id,
                    TriggerEvent::Dequeued {
                        connection_id: item.connection_id.clone(),
                        remaining: self.queue.size(target_pod_id),
                    },
                );
                self.spawn_execute(item);
                return true;
            }
            // drained by another claimer in between: release and look again
            self.collaborators.pods.set_status(canvas_id, target_pod_id, PodStatus::Idle);
        }
    }

    /// Detaches a deleted connection from queues and aggregations.
    pub fn forget_connection(
        self: &Arc<Self>,
        canvas_id: &str,
        connection: &Connection,
    ) {
        let source = connection.source_pod_id.as_str();
        let target = connection.target_pod_id.as_str();

        let dropped = self.queue.remove_by_connection(&connection.id);
        if dropped > 0 {
            debug!("dropped {} queued deliveries of {}", dropped, connection.id);
        }

        if let Some(0) = self.countdown.remove_source(target, source) {
            self.countdown.cancel(target);
        }

        match self.fixed.remove_source(target, source) {
            Some(status) if status.all_responded => self.spawn_resume_fixed(canvas_id, target),
            _ => {}
        }
    }

    /// Drops everything pending for a deleted pod as target or sender.
    ///
    /// Edges touching the pod are handled by [`Pipeline::forget_connection`].
    pub fn forget_pod(
        &self,
        _canvas_id: &str,
        pod_id: &str,
    ) {
        if self.countdown.cancel(pod_id) {
            debug!("countdown window for deleted pod {} cancelled", pod_id);
        }
        self.fixed.clear(pod_id);
        self.queue.remove_by_pod(pod_id);
    }

    fn spawn_edge(
        self: &Arc<Self>,
        canvas_id: &str,
        source_pod_id: &str,
        edge: Connection,
        strategy: Arc<dyn TriggerStrategy>,
    ) {
        let this = self.clone();
        let canvas = canvas_id.to_string();
        let source = source_pod_id.to_string();
        let fut: BoxFuture<'static, ()> = Box::pin(async move { this.run_edge(&canvas, &source, edge, strategy).await });
        self.runtime.spawn(fut);
    }

    fn spawn_execute(
        self: &Arc<Self>,
        item: QueueItem,
    ) {
        let this = self.clone();
        let fut: BoxFuture<'static, ()> = Box::pin(async move { this.execute(item).await });
        self.runtime.spawn(fut);
    }

    fn spawn_resume_fixed(
        self: &Arc<Self>,
        canvas_id: &str,
        target_pod_id: &str,
    ) {
        let this = self.clone();
        let canvas = canvas_id.to_string();
        let target = target_pod_id.to_string();
        let fut: BoxFuture<'static, ()> = Box::pin(async move { this.resume_fixed(&canvas, &target).await });
        self.runtime.spawn(fut);
    }

    async fn run_edge(
        self: &Arc<Self>,
        canvas_id: &str,
        source_pod_id: &str,
        edge: Connection,
        strategy: Arc<dyn TriggerStrategy>,
    ) {
        trace!("pipeline::run_edge({}, {} -> {})", canvas_id, source_pod_id, edge.target_pod_id);
        let Some(summary) = self.summarize(canvas_id, source_pod_id, &edge.target_pod_id).await else {
            self.board.set_status(canvas_id, &edge.id, ConnectionStatus::Idle);
            return;
        };

        let Some(edge) = self.board.connections().get_by_id(canvas_id, &edge.id) else {
            debug!("connection {} deleted while summarizing, edge aborted", edge.id);
            return;
        };

        let result = match strategy.collect_sources(canvas_id, source_pod_id, &edge, &summary).await {
            Some(result) => result,
            None => self.collect_fixed(canvas_id, source_pod_id, &edge, &summary),
        };
        if !result.ready {
            trace!("pipeline: {} -> {} not ready", source_pod_id, edge.target_pod_id);
            return;
        }

        // the edge may have been deleted during a countdown window
        let Some(primary) = self.live_primary(canvas_id, &edge.id, result.participating_connection_ids.as_deref()) else {
            debug!("connections into {} deleted while collecting, edge aborted", edge.target_pod_id);
            return;
        };

        let item = QueueItem::new(
            canvas_id,
            &primary.id,
            &primary.source_pod_id,
            &primary.target_pod_id,
            result.merged_content.unwrap_or(summary.content),
            result.is_summarized.unwrap_or(summary.is_summarized),
            primary.trigger_mode,
        )
        .with_participants(result.participating_connection_ids);
        self.dispatch(item).await;
    }

    /// The edge a delivery is reported under: `connection_id` while it
    /// exists, otherwise the first participating edge still in the graph.
    fn live_primary(
        &self,
        canvas_id: &str,
        connection_id: &str,
        participating: Option<&[ConnectionId]>,
    ) -> Option<Connection> {
        let connections = self.board.connections();
        connections
            .get_by_id(canvas_id, connection_id)
            .or_else(|| participating.unwrap_or_default().iter().find_map(|id| connections.get_by_id(canvas_id, id)))
    }

    async fn summarize(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
    ) -> Option<Summary> {
        match self.collaborators.summarizer.summarize(canvas_id, source_pod_id, target_pod_id).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("summarizing {} for {} failed: {}", source_pod_id, target_pod_id, e);
                match self.collaborators.pods.latest_output(canvas_id, source_pod_id) {
                    Some(output) => Some(Summary::raw(output)),
                    None => {
                        warn!("no output of {} to deliver to {}, edge aborted", source_pod_id, target_pod_id);
                        None
                    }
                }
            }
        }
    }

    /// Sources of `target_pod_id` that take part in fixed-set fan-in.
    fn fixed_sources(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> Vec<PodId> {
        self.board
            .connections()
            .find_by_target(canvas_id, target_pod_id)
            .into_iter()
            .filter(|c| c.trigger_mode.is_fixed_set())
            .map(|c| c.source_pod_id)
            .collect()
    }

    fn collect_fixed(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        edge: &Connection,
        summary: &Summary,
    ) -> CollectResult {
        let target = edge.target_pod_id.as_str();
        let required = self.fixed_sources(canvas_id, target);
        if required.len() <= 1 && !self.fixed.is_pending(target) {
            return CollectResult::single(summary);
        }

        self.fixed.initialize(target, required);
        let status = self.fixed.record_completion(target, source_pod_id, summary);
        let (ready, total) = self.fixed.get(target).map(|p| (p.completed_sources.len(), p.required_source_pod_ids.len())).unwrap_or_default();

        self.board.set_status(canvas_id, &edge.id, ConnectionStatus::Waiting);
        self.board.emit(
            canvas_id,
            target,
            TriggerEvent::Waiting {
                connection_id: edge.id.clone(),
                source_pod_id: source_pod_id.to_string(),
                ready,
                total: Some(total),
            },
        );

        if !status.all_responded {
            return CollectResult::not_ready();
        }
        self.settle_fixed(canvas_id, target)
    }

    /// Resolves a fully responded fan-in: merged content when every source
    /// completed, a "not triggered" notice when any was rejected.
    fn settle_fixed(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> CollectResult {
        let Some(pending) = self.fixed.take(target_pod_id) else {
            return CollectResult::not_ready();
        };
        let participating: Vec<ConnectionId> = pending
            .completed_sources
            .iter()
            .filter_map(|s| self.board.connections().find_edge(canvas_id, &s.source_pod_id, target_pod_id))
            .map(|c| c.id)
            .collect();

        if !pending.rejected_sources.is_empty() {
            let mut rejected: Vec<(PodId, String)> = pending.rejected_sources.into_iter().collect();
            rejected.sort();
            info!("fan-in for {} not triggered, {} sources rejected", target_pod_id, rejected.len());
            self.board.emit(
                canvas_id,
                target_pod_id,
                TriggerEvent::NotTriggered {
                    rejected,
                },
            );
            self.board.set_all(canvas_id, &participating, ConnectionStatus::Idle);
            return CollectResult::not_ready();
        }

        let Some((content, is_summarized)) = combine(&pending.completed_sources, |id| self.collaborators.pods.name(canvas_id, id)) else {
            return CollectResult::not_ready();
        };
        if pending.completed_sources.len() > 1 {
            self.board.emit(
                canvas_id,
                target_pod_id,
                TriggerEvent::Merged {
                    source_pod_ids: pending.completed_sources.source_ids(),
                    participating_connection_ids: participating.clone(),
                    preview: preview(&content),
                },
            );
        }
        CollectResult::ready(content, is_summarized, Some(participating))
    }

    /// Delivers a fan-in whose last outstanding source was deleted.
    async fn resume_fixed(
        self: &Arc<Self>,
        canvas_id: &str,
        target_pod_id: &str,
    ) {
        let result = self.settle_fixed(canvas_id, target_pod_id);
        if !result.ready {
            return;
        }
        let ids = result.participating_connection_ids.unwrap_or_default();
        let Some(primary) = ids.first().and_then(|id| self.board.connections().get_by_id(canvas_id, id)) else {
            return;
        };
        let item = QueueItem::new(
            canvas_id,
            &primary.id,
            &primary.source_pod_id,
            target_pod_id,
            result.merged_content.unwrap_or_default(),
            result.is_summarized.unwrap_or(false),
            primary.trigger_mode,
        )
        .with_participants(Some(ids));
        self.dispatch(item).await;
    }

    fn handle_rejection(
        self: &Arc<Self>,
        canvas_id: &str,
        source_pod_id: &str,
        edge: &Connection,
        decision: &TriggerDecision,
    ) {
        let target = edge.target_pod_id.as_str();
        let reason = decision.reason.clone().unwrap_or_else(|| "rejected".to_string());
        debug!("{} -> {} rejected: {}", source_pod_id, target, reason);

        let required = self.fixed_sources(canvas_id, target);
        if required.len() > 1 || self.fixed.is_pending(target) {
            self.fixed.initialize(target, required);
            let status = self.fixed.record_rejection(target, source_pod_id, &reason);
            if status.all_responded {
                self.settle_fixed(canvas_id, target);
            }
        }
        self.board.set_status(canvas_id, &edge.id, ConnectionStatus::Idle);
    }

    /// Executes now when the target is idle and nobody is queued ahead,
    /// otherwise queues the item.
    async fn dispatch(
        self: &Arc<Self>,
        item: QueueItem,
    ) {
        let canvas = item.canvas_id.clone();
        let target = item.target_pod_id.clone();

        let claim = if self.queue.size(&target) > 0 {
            Claim::Busy
        } else {
            self.try_claim(&canvas, &target)
        };
        match claim {
            Claim::Claimed => self.execute(item).await,
            Claim::Busy => {
                let connection_id = item.connection_id.clone();
                let ids = item.connection_ids();
                let r = self.queue.enqueue(item);
                self.board.set_all(&canvas, &ids, ConnectionStatus::Queued);
                self.board.emit(
                    &canvas,
                    &target,
                    TriggerEvent::Queued {
                        connection_id,
                        position: r.position,
                        queue_size: r.queue_size,
                    },
                );
                // the target may have gone idle between the claim and the enqueue
                self.process_next_in_queue(&canvas, &target);
            }
            Claim::Missing => {
                warn!("target pod {} not found, delivery of {} aborted", target, item.connection_id);
                self.board.set_all(&canvas, &item.connection_ids(), ConnectionStatus::Idle);
            }
        }
    }

    fn try_claim(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> Claim {
        let _guard = self.claim.lock().unwrap();
        match self.collaborators.pods.status(canvas_id, target_pod_id) {
            None => Claim::Missing,
            Some(status) if status.is_idle() => {
                self.collaborators.pods.set_status(canvas_id, target_pod_id, PodStatus::Chatting);
                Claim::Claimed
            }
            Some(_) => Claim::Busy,
        }
    }

    /// Runs one delivery on a claimed target.
    async fn execute(
        self: &Arc<Self>,
        item: QueueItem,
    ) {
        let canvas = item.canvas_id.clone();
        let target = item.target_pod_id.clone();
        let ids = item.connection_ids();

        self.board.set_all(&canvas, &ids, ConnectionStatus::Active);
        self.board.emit(
            &canvas,
            &target,
            TriggerEvent::Triggered {
                connection_id: item.connection_id.clone(),
                participating_connection_ids: ids.clone(),
                is_summarized: item.is_summarized,
            },
        );

        let request = DeliveryRequest {
            canvas_id: canvas.clone(),
            connection_id: item.connection_id.clone(),
            target_pod_id: target.clone(),
            content: item.summary,
            is_summarized: item.is_summarized,
            participating_connection_ids: item.participating_connection_ids,
        };
        let outcome = self.collaborators.executor.deliver(request).await;

        self.collaborators.pods.set_status(&canvas, &target, PodStatus::Idle);
        self.board.set_all(&canvas, &ids, ConnectionStatus::Idle);
        let event = match &outcome {
            Ok(()) => TriggerEvent::Complete {
                connection_id: item.connection_id.clone(),
                success: true,
                error: None,
            },
            Err(e) => {
                warn!("delivery of {} to {} failed: {}", item.connection_id, target, e);
                TriggerEvent::Complete {
                    connection_id: item.connection_id.clone(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.board.emit(&canvas, &target, event);

        self.process_next_in_queue(&canvas, &target);
        if outcome.is_ok() {
            self.spawn_source_complete(&canvas, &target);
        }
    }
}
