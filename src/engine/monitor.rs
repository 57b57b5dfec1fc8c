use std::sync::Arc;

use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tracing::{debug, warn};

use crate::{
    common::Shutdown,
    events::{Event, Message},
    runtime::Channel,
};

/// Logs every trigger event until the engine shuts down.
pub struct Monitor {
    channel: Arc<Channel>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Monitor {
    pub fn new(
        channel: Arc<Channel>,
        runtime: Handle,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            channel,
            runtime,
            shutdown,
        }
    }

    pub fn monitor(&self) {
        let mut event_queue = self.channel.event_queue().subscribe();
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    msg = event_queue.recv() => match msg {
                        Ok(event) => log_event(&event),
                        Err(RecvError::Lagged(n)) => warn!("event monitor lagged, {} events skipped", n),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
    }
}

fn log_event(e: &Event<Message>) {
    if e.event.is_error() {
        warn!(canvas = %e.canvas_id, pod = %e.pod_id, "{}: {:?}", e.event.str(), e.event);
    } else {
        debug!(canvas = %e.canvas_id, pod = %e.pod_id, "{}: {:?}", e.event.str(), e.event);
    }
}
