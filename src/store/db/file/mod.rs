use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::trace;

use crate::{
    PodflowError, Result,
    model::Connection,
    store::{ConnectionPersist, map_db_err},
};

const CONNECTIONS_FILE: &str = "connections.json";

/// Persists each canvas as a pretty-printed JSON array at
/// `<data_dir>/<canvas_id>/connections.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new<T: AsRef<Path>>(data_dir: T) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn canvas_dir(
        &self,
        canvas_id: &str,
    ) -> Result<PathBuf> {
        if canvas_id.is_empty() || canvas_id.contains(['/', '\\']) || canvas_id == "." || canvas_id == ".." {
            return Err(PodflowError::Store(format!("invalid canvas id: {:?}", canvas_id)));
        }
        Ok(self.data_dir.join(canvas_id))
    }
}

impl ConnectionPersist for FileStore {
    fn save(
        &self,
        canvas_id: &str,
        connections: &[Connection],
    ) -> Result<()> {
        let dir = self.canvas_dir(canvas_id)?;
        fs::create_dir_all(&dir).map_err(map_db_err)?;

        // write then rename so a crash never leaves a truncated file behind
        let tmp = dir.join(format!("{}.tmp", CONNECTIONS_FILE));
        let text = serde_json::to_string_pretty(connections)?;
        fs::write(&tmp, text).map_err(map_db_err)?;
        fs::rename(&tmp, dir.join(CONNECTIONS_FILE)).map_err(map_db_err)?;

        trace!("file_store::save({}, {} connections)", canvas_id, connections.len());
        Ok(())
    }

    fn load(
        &self,
        canvas_id: &str,
    ) -> Result<Vec<Connection>> {
        let path = self.canvas_dir(canvas_id)?.join(CONNECTIONS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path).map_err(map_db_err)?;
        let connections = serde_json::from_str::<Vec<Connection>>(&text)?;
        Ok(connections)
    }
}
