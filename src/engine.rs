//! Trigger engine - the main entry point for podflow.
//!
//! The engine owns the connection graph, the event channel and the
//! pipeline, and coordinates their lifecycle:
//! - Starting the event monitor, handler dispatch and write-behind worker
//! - Entering the pipeline when a pod completes
//! - Cleaning up aggregations and queues when pods or connections go away
//! - Graceful shutdown

mod monitor;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::runtime::{Handle, Runtime};
use tracing::info;

use crate::{
    Config, PodflowError, Result,
    adapter::DecisionModel,
    aggregate::CountdownAggregator,
    common::Shutdown,
    delivery::TargetQueue,
    dispatcher::{Collaborators, Pipeline},
    model::{Connection, TriggerMode},
    runtime::{Channel, StatusBoard},
    store::{ConnectionPersist, ConnectionStore},
    strategy::{AiDecideStrategy, DirectStrategy, ImmediateStrategy, StrategyRegistry},
};

use monitor::Monitor;

/// The trigger orchestration engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new()
///     .summarizer(summarizer)
///     .executor(executor)
///     .pods(pods)
///     .build()?;
/// engine.launch();
///
/// engine.create_connection("canvas", "writer", "reviewer", TriggerMode::Auto)?;
/// engine.on_pod_complete("canvas", "writer")?;
///
/// engine.shutdown();
/// ```
pub struct Engine {
    /// Event channel for trigger events.
    channel: Arc<Channel>,
    /// Connection graph with write-behind persistence.
    connections: Arc<ConnectionStore>,
    pipeline: Arc<Pipeline>,
    /// Background event logger.
    monitor: Monitor,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Handle all engine tasks are spawned on.
    runtime: Handle,
    /// Runtime built by the engine itself, kept alive for its lifetime.
    _rt: Option<Arc<Runtime>>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub(crate) fn new(
        config: &Config,
        runtime: Handle,
        rt: Option<Arc<Runtime>>,
        collaborators: Collaborators,
        decision_model: Arc<dyn DecisionModel>,
        persist: Arc<dyn ConnectionPersist>,
    ) -> Self {
        let channel = Arc::new(Channel::new(config.channel.event_queue_size, runtime.clone()));
        let connections = Arc::new(ConnectionStore::new(persist));
        let board = StatusBoard::new(connections.clone(), channel.clone());
        let countdown = Arc::new(CountdownAggregator::new());

        let mut strategies = StrategyRegistry::new();
        strategies.register(Arc::new(ImmediateStrategy::new()));
        strategies.register(Arc::new(DirectStrategy::new(
            board.clone(),
            countdown.clone(),
            collaborators.pods.clone(),
            runtime.clone(),
            Duration::from_millis(config.aggregate.direct_window_ms),
            Duration::from_millis(config.aggregate.direct_safety_timeout_ms),
        )));
        strategies.register(Arc::new(AiDecideStrategy::new(board.clone(), decision_model)));

        let pipeline = Arc::new(Pipeline::new(board, strategies, countdown, collaborators, runtime.clone()));
        let shutdown = Arc::new(Shutdown::new());
        let monitor = Monitor::new(channel.clone(), runtime.clone(), shutdown.clone());

        Self {
            channel,
            connections,
            pipeline,
            monitor,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            _rt: rt,
            shutdown,
        }
    }

    /// Starts the engine.
    ///
    /// This method:
    /// - Starts the event monitor
    /// - Begins dispatching events to registered handlers
    /// - Spawns the connection write-behind worker
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        self.monitor.monitor();
        self.channel.listen();
        self.connections.spawn_writer(&self.runtime, self.shutdown.clone());
        info!("podflow engine launched");
    }

    /// Gracefully shuts down the engine and writes pending connection changes.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        self.channel.shutdown();
        self.connections.flush();
        info!("podflow engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Notifies the engine that `pod_id` finished producing output. Its
    /// outgoing connections are evaluated in the background.
    pub fn on_pod_complete(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Result<()> {
        self.ensure_running()?;
        self.pipeline.spawn_source_complete(canvas_id, pod_id);
        Ok(())
    }

    /// Starts the next queued delivery for `target_pod_id` if the pod is idle.
    pub fn process_next_in_queue(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.pipeline.process_next_in_queue(canvas_id, target_pod_id))
    }

    pub fn create_connection(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
        trigger_mode: TriggerMode,
    ) -> Result<Connection> {
        self.connections.create(canvas_id, source_pod_id, target_pod_id, trigger_mode)
    }

    /// Changes the trigger mode of a connection. Any fan-in the connection
    /// took part in under its old mode is left.
    pub fn update_trigger_mode(
        &self,
        canvas_id: &str,
        connection_id: &str,
        trigger_mode: TriggerMode,
    ) -> Result<Connection> {
        let current = self.connections.get_by_id(canvas_id, connection_id).ok_or_else(|| PodflowError::NotFound(format!("connection {}", connection_id)))?;
        if current.trigger_mode != trigger_mode {
            self.pipeline.forget_connection(canvas_id, &current);
        }
        self.connections.update_trigger_mode(canvas_id, connection_id, trigger_mode)
    }

    /// Loads the persisted connections of a canvas, replacing the in-memory ones.
    pub fn load_canvas(
        &self,
        canvas_id: &str,
    ) -> Result<usize> {
        self.connections.load(canvas_id)
    }

    pub fn delete_connection(
        &self,
        canvas_id: &str,
        connection_id: &str,
    ) -> Result<Connection> {
        let removed = self.connections.delete(canvas_id, connection_id).ok_or_else(|| PodflowError::NotFound(format!("connection {}", connection_id)))?;
        self.pipeline.forget_connection(canvas_id, &removed);
        Ok(removed)
    }

    /// Removes a pod from the graph: every connection touching it, its
    /// pending aggregations and its queued deliveries.
    pub fn delete_pod(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Vec<Connection> {
        self.pipeline.forget_pod(canvas_id, pod_id);
        let removed = self.connections.delete_by_pod(canvas_id, pod_id);
        for connection in &removed {
            self.pipeline.forget_connection(canvas_id, connection);
        }
        removed
    }

    pub fn connections(&self) -> Arc<ConnectionStore> {
        self.connections.clone()
    }

    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn queue(&self) -> Arc<TargetQueue> {
        self.pipeline.queue().clone()
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(PodflowError::Engine("Engine is not running".to_string()));
        }
        Ok(())
    }
}
