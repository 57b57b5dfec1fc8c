//! Connection graph storage.
//!
//! [`ConnectionStore`] is the authoritative in-memory edge set. Every mutation
//! schedules a write-behind of the canvas' full edge set to a
//! [`ConnectionPersist`] backend:
//! - `MemStore`: in-memory snapshots for testing
//! - `FileStore`: one JSON file per canvas under the data directory

mod db;
mod store;

use std::error::Error;

use crate::{PodflowError, Result, model::Connection};

pub use db::{FileStore, MemStore};
pub use store::ConnectionStore;

/// Maps backend errors to PodflowError.
fn map_db_err(err: impl Error) -> PodflowError {
    PodflowError::Store(err.to_string())
}

/// Durable storage for the connections of a canvas.
pub trait ConnectionPersist: Send + Sync {
    /// Replaces the persisted edge set of `canvas_id`.
    fn save(
        &self,
        canvas_id: &str,
        connections: &[Connection],
    ) -> Result<()>;

    /// Loads the persisted edge set of `canvas_id`, empty when nothing was saved.
    fn load(
        &self,
        canvas_id: &str,
    ) -> Result<Vec<Connection>>;
}
