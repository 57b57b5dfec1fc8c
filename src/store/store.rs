use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use petgraph::{algo::is_cyclic_directed, graphmap::DiGraphMap};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::{
    PodflowError, Result, ShareLock,
    common::{Queue, Shutdown},
    model::{CanvasId, Connection, ConnectionStatus, DecideStatus, TriggerMode},
};

use super::ConnectionPersist;

/// Authoritative store of the directed edges of every canvas.
///
/// Edges keep their creation order within a canvas. Mutations never wait on
/// disk: they push the canvas id onto a write queue drained by a background
/// writer which snapshots the canvas at write time. A canvas is queued at
/// most once until the writer picks it up.
pub struct ConnectionStore {
    canvases: ShareLock<HashMap<CanvasId, Vec<Connection>>>,
    persist: Arc<dyn ConnectionPersist>,
    writes: Arc<Queue<CanvasId>>,
    dirty: ShareLock<HashSet<CanvasId>>,
}

impl ConnectionStore {
    pub fn new(persist: Arc<dyn ConnectionPersist>) -> Self {
        Self {
            canvases: Arc::new(RwLock::new(HashMap::new())),
            persist,
            writes: Queue::unbounded(),
            dirty: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Creates the edge `source -> target`. At most one edge exists per ordered pair.
    pub fn create(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
        trigger_mode: TriggerMode,
    ) -> Result<Connection> {
        trace!("connection_store::create({}, {} -> {})", canvas_id, source_pod_id, target_pod_id);
        if source_pod_id.is_empty() || target_pod_id.is_empty() {
            return Err(PodflowError::Connection("connection endpoints must not be empty".to_string()));
        }

        let connection = Connection::new(source_pod_id, target_pod_id, trigger_mode);
        {
            let mut canvases = self.canvases.write().unwrap();
            let edges = canvases.entry(canvas_id.to_string()).or_default();
            if edges.iter().any(|c| c.source_pod_id == source_pod_id && c.target_pod_id == target_pod_id) {
                return Err(PodflowError::Connection(format!(
                    "connection {} -> {} already exists",
                    source_pod_id, target_pod_id
                )));
            }
            edges.push(connection.clone());
        }
        self.schedule_save(canvas_id);

        if self.has_cycle(canvas_id) {
            warn!(
                "connection {} -> {} closes a cycle in canvas {}; completions may propagate indefinitely",
                source_pod_id, target_pod_id, canvas_id
            );
        }
        Ok(connection)
    }

    pub fn get_by_id(
        &self,
        canvas_id: &str,
        connection_id: &str,
    ) -> Option<Connection> {
        let canvases = self.canvases.read().unwrap();
        canvases.get(canvas_id).and_then(|edges| edges.iter().find(|c| c.id == connection_id).cloned())
    }

    pub fn list(
        &self,
        canvas_id: &str,
    ) -> Vec<Connection> {
        let canvases = self.canvases.read().unwrap();
        canvases.get(canvas_id).cloned().unwrap_or_default()
    }

    pub fn find_by_source(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
    ) -> Vec<Connection> {
        self.filter(canvas_id, |c| c.source_pod_id == source_pod_id)
    }

    pub fn find_by_target(
        &self,
        canvas_id: &str,
        target_pod_id: &str,
    ) -> Vec<Connection> {
        self.filter(canvas_id, |c| c.target_pod_id == target_pod_id)
    }

    /// The edge `source -> target`, if any.
    pub fn find_edge(
        &self,
        canvas_id: &str,
        source_pod_id: &str,
        target_pod_id: &str,
    ) -> Option<Connection> {
        self.filter(canvas_id, |c| c.source_pod_id == source_pod_id && c.target_pod_id == target_pod_id).into_iter().next()
    }

    pub fn update_status(
        &self,
        canvas_id: &str,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> Result<Connection> {
        self.modify(canvas_id, connection_id, |c| c.connection_status = status)
    }

    pub fn update_decide_status(
        &self,
        canvas_id: &str,
        connection_id: &str,
        status: DecideStatus,
        reason: Option<String>,
    ) -> Result<Connection> {
        self.modify(canvas_id, connection_id, |c| {
            c.decide_status = status;
            c.decide_reason = reason;
        })
    }

    pub fn update_trigger_mode(
        &self,
        canvas_id: &str,
        connection_id: &str,
        trigger_mode: TriggerMode,
    ) -> Result<Connection> {
        self.modify(canvas_id, connection_id, |c| c.trigger_mode = trigger_mode)
    }

    /// Removes a connection and returns it.
    pub fn delete(
        &self,
        canvas_id: &str,
        connection_id: &str,
    ) -> Option<Connection> {
        let removed = {
            let mut canvases = self.canvases.write().unwrap();
            let edges = canvases.get_mut(canvas_id)?;
            let idx = edges.iter().position(|c| c.id == connection_id)?;
            edges.remove(idx)
        };
        self.schedule_save(canvas_id);
        Some(removed)
    }

    /// Removes every connection touching `pod_id` and returns them.
    pub fn delete_by_pod(
        &self,
        canvas_id: &str,
        pod_id: &str,
    ) -> Vec<Connection> {
        let removed: Vec<Connection> = {
            let mut canvases = self.canvases.write().unwrap();
            let Some(edges) = canvases.get_mut(canvas_id) else {
                return Vec::new();
            };
            let (removed, kept): (Vec<Connection>, Vec<Connection>) = edges.drain(..).partition(|c| c.source_pod_id == pod_id || c.target_pod_id == pod_id);
            *edges = kept;
            removed
        };
        if !removed.is_empty() {
            self.schedule_save(canvas_id);
        }
        removed
    }

    /// Replaces the in-memory edges of a canvas with the persisted ones.
    pub fn load(
        &self,
        canvas_id: &str,
    ) -> Result<usize> {
        let connections = self.persist.load(canvas_id)?;
        let count = connections.len();
        self.canvases.write().unwrap().insert(canvas_id.to_string(), connections);
        debug!("loaded {} connections for canvas {}", count, canvas_id);
        Ok(count)
    }

    /// Whether the canvas' edges form at least one directed cycle.
    pub fn has_cycle(
        &self,
        canvas_id: &str,
    ) -> bool {
        let edges = self.list(canvas_id);
        let mut graph = DiGraphMap::<&str, ()>::new();
        for edge in edges.iter() {
            graph.add_edge(edge.source_pod_id.as_str(), edge.target_pod_id.as_str(), ());
        }
        is_cyclic_directed(&graph)
    }

    /// Drops queued writes and writes every canvas synchronously, so the
    /// persisted state matches memory even if the writer is mid-write.
    pub fn flush(&self) {
        while self.writes.try_next().is_some() {}
        self.dirty.write().unwrap().clear();
        let canvas_ids: Vec<CanvasId> = self.canvases.read().unwrap().keys().cloned().collect();
        for canvas_id in canvas_ids {
            self.write_canvas(&canvas_id);
        }
    }

    pub(crate) fn spawn_writer(
        self: &Arc<Self>,
        runtime: &Handle,
        shutdown: Arc<Shutdown>,
    ) {
        let store = self.clone();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Some(canvas_id) = store.writes.next_async() => {
                        store.dirty.write().unwrap().remove(&canvas_id);
                        let writer = store.clone();
                        let _ = tokio::task::spawn_blocking(move || writer.write_canvas(&canvas_id)).await;
                    }
                }
            }
        });
    }

    fn write_canvas(
        &self,
        canvas_id: &str,
    ) {
        let snapshot = self.list(canvas_id);
        if let Err(e) = self.persist.save(canvas_id, &snapshot) {
            warn!("failed to persist connections of canvas {}: {}", canvas_id, e);
        }
    }

    /// Canvases waiting for the background writer.
    pub(crate) fn pending_writes(&self) -> usize {
        self.dirty.read().unwrap().len()
    }

    fn schedule_save(
        &self,
        canvas_id: &str,
    ) {
        if !self.dirty.write().unwrap().insert(canvas_id.to_string()) {
            return;
        }
        if let Err(e) = self.writes.send(canvas_id.to_string()) {
            warn!("failed to schedule save of canvas {}: {}", canvas_id, e);
        }
    }

    fn filter(
        &self,
        canvas_id: &str,
        pred: impl Fn(&Connection) -> bool,
    ) -> Vec<Connection> {
        let canvases = self.canvases.read().unwrap();
        canvases.get(canvas_id).map(|edges| edges.iter().filter(|c| pred(c)).cloned().collect()).unwrap_or_default()
    }

    fn modify(
        &self,
        canvas_id: &str,
        connection_id: &str,
        f: impl FnOnce(&mut Connection),
    ) -> Result<Connection> {
        let updated = {
            let mut canvases = self.canvases.write().unwrap();
            let connection = canvases
                .get_mut(canvas_id)
                .and_then(|edges| edges.iter_mut().find(|c| c.id == connection_id))
                .ok_or(PodflowError::NotFound(format!("connection {}", connection_id)))?;
            f(connection);
            connection.clone()
        };
        self.schedule_save(canvas_id);
        Ok(updated)
    }
}
