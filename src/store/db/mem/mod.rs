use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    Result, ShareLock,
    model::{CanvasId, Connection},
    store::ConnectionPersist,
};

/// In-memory persistence backend.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    canvases: ShareLock<HashMap<CanvasId, Vec<Connection>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            canvases: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Last saved edge set of a canvas.
    pub fn snapshot(
        &self,
        canvas_id: &str,
    ) -> Option<Vec<Connection>> {
        self.canvases.read().unwrap().get(canvas_id).cloned()
    }
}

impl ConnectionPersist for MemStore {
    fn save(
        &self,
        canvas_id: &str,
        connections: &[Connection],
    ) -> Result<()> {
        self.canvases.write().unwrap().insert(canvas_id.to_string(), connections.to_vec());
        Ok(())
    }

    fn load(
        &self,
        canvas_id: &str,
    ) -> Result<Vec<Connection>> {
        Ok(self.snapshot(canvas_id).unwrap_or_default())
    }
}
