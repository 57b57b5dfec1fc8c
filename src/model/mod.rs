mod connection;
mod pod;

pub use connection::{CanvasId, Connection, ConnectionId, ConnectionStatus, DecideStatus, PodId, TriggerMode};
pub use pod::PodStatus;
