use std::sync::Arc;

use tracing::debug;

use crate::{
    events::TriggerEvent,
    model::{Connection, ConnectionStatus, DecideStatus},
    runtime::Channel,
    store::ConnectionStore,
};

/// Writes connection status transitions and announces each one on the channel.
///
/// A connection deleted mid-pipeline is not an error here: the update is
/// skipped and logged.
#[derive(Clone)]
pub struct StatusBoard {
    connections: Arc<ConnectionStore>,
    channel: Arc<Channel>,
}

impl StatusBoard {
    pub fn new(
        connections: Arc<ConnectionStore>,
        channel: Arc<Channel>,
    ) -> Self {
        Self {
            connections,
            channel,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionStore> {
        &self.connections
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn set_status(
        &self,
        canvas_id: &str,
        connection_id: &str,
        status: ConnectionStatus,
    ) -> Option<Connection> {
        match self.connections.update_status(canvas_id, connection_id, status) {
            Ok(conn) => {
                self.channel.emit(
                    canvas_id,
                    &conn.target_pod_id,
                    TriggerEvent::StatusChanged {
                        connection_id: conn.id.clone(),
                        status,
                    },
                );
                Some(conn)
            }
            Err(e) => {
                debug!("skip status {} for {}: {}", status.as_ref(), connection_id, e);
                None
            }
        }
    }

    pub fn set_all(
        &self,
        canvas_id: &str,
        connection_ids: &[String],
        status: ConnectionStatus,
    ) {
        for id in connection_ids {
            self.set_status(canvas_id, id, status);
        }
    }

    pub fn set_decide_status(
        &self,
        canvas_id: &str,
        connection_id: &str,
        status: DecideStatus,
        reason: Option<String>,
    ) -> Option<Connection> {
        match self.connections.update_decide_status(canvas_id, connection_id, status, reason) {
            Ok(conn) => Some(conn),
            Err(e) => {
                debug!("skip decide status {} for {}: {}", status.as_ref(), connection_id, e);
                None
            }
        }
    }

    pub fn emit(
        &self,
        canvas_id: &str,
        pod_id: &str,
        event: TriggerEvent,
    ) {
        self.channel.emit(canvas_id, pod_id, event);
    }
}
