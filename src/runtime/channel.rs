use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, sync::broadcast};

use crate::{
    PodflowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{Event, Message, TriggerEvent},
    utils,
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().unwrap().clone();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

pub type TriggerEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type TriggerEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the canvas id
    /// eg. canvas1*
    pub canvas: String,

    /// use the glob pattern to match the pod id
    /// eg. pod1*
    pub pod: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            canvas: "*".to_string(),
            pod: "*".to_string(),
        }
    }
}

#[allow(unused)]
impl ChannelOptions {
    pub fn new(
        canvas: String,
        pod: String,
    ) -> Self {
        Self {
            canvas,
            pod,
        }
    }

    pub fn with_canvas(canvas: String) -> Self {
        Self {
            canvas,
            pod: "*".to_string(),
        }
    }

    pub fn with_pod(pod: String) -> Self {
        Self {
            canvas: "*".to_string(),
            pod,
        }
    }
}

/// Fire-and-forget event bus.
///
/// `emit` never blocks and never fails: with no subscriber the event is dropped.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,

    events: ShareLock<Vec<TriggerEventHandle>>,
    events_async: ShareLock<Vec<TriggerEventHandleAsync>>,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(
        capacity: usize,
        runtime: Handle,
    ) -> Self {
        Self {
            event_queue: BroadcastQueue::new(capacity),
            events: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Event<Message>>> {
        self.event_queue.clone()
    }

    /// Subscribes to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<Message>> {
        self.event_queue.subscribe()
    }

    pub fn emit(
        &self,
        canvas_id: &str,
        pod_id: &str,
        event: TriggerEvent,
    ) {
        let msg = Message {
            canvas_id: canvas_id.to_string(),
            pod_id: pod_id.to_string(),
            event,
            timestamp: utils::time::time_millis(),
        };
        let _ = self.event_queue.send(Event::new(&msg));
    }

    pub(crate) fn listen(&self) {
        if self.shutdown.is_terminated() {
            return;
        }
        let mut event_queue = self.event_queue.subscribe();
        let events = self.events.clone();
        let events_async = self.events_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(e) = event_queue.recv() => {
                        let evt = e.clone();
                        dispatch_event!(events, &evt);
                        dispatch_event_async!(events_async, &e);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Registers filtered handlers on a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

#[allow(unused)]
impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        let canvas = globset::Glob::new(&options.canvas).map_err(|e| PodflowError::Config(format!("invalid canvas pattern: {}", e)))?;
        let pod = globset::Glob::new(&options.pod).map_err(|e| PodflowError::Config(format!("invalid pod pattern: {}", e)))?;

        Ok(Self {
            channel,
            glob: (canvas.compile_matcher(), pod.compile_matcher()),
        })
    }

    pub fn on_complete(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if e.event.is_complete() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if e.event.is_error() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        self.channel.events_async.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    e: &Event<Message>,
) -> bool {
    let (pat_canvas, pat_pod) = glob;
    pat_canvas.is_match(&e.canvas_id) && pat_pod.is_match(&e.pod_id)
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio::runtime::Handle;

    use super::{Channel, ChannelEvent, ChannelOptions};
    use crate::events::TriggerEvent;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let channel = Channel::new(16, Handle::current());
        let mut rx = channel.subscribe();
        channel.emit(
            "canvas",
            "pod-b",
            TriggerEvent::Approved {
                connection_id: "c1".to_string(),
            },
        );
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.pod_id, "pod-b");
        assert_eq!(msg.event.str(), "Approved");
    }

    #[tokio::test]
    async fn test_emit_without_subscriber_is_silent() {
        let channel = Channel::new(16, Handle::current());
        channel.emit(
            "canvas",
            "pod",
            TriggerEvent::DecidePending {
                connection_ids: vec![],
            },
        );
    }

    #[tokio::test]
    async fn test_filtered_handler() {
        let channel = Arc::new(Channel::new(16, Handle::current()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::with_pod("target*".to_string())).unwrap().on_complete(move |e| {
            sink.lock().unwrap().push(e.pod_id.clone());
        });
        channel.listen();

        for pod in ["target-1", "other", "target-2"] {
            channel.emit(
                "canvas",
                pod,
                TriggerEvent::Complete {
                    connection_id: "c".to_string(),
                    success: true,
                    error: None,
                },
            );
        }
        channel.emit(
            "canvas",
            "target-3",
            TriggerEvent::Dequeued {
                connection_id: "c".to_string(),
                remaining: 0,
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        channel.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec!["target-1".to_string(), "target-2".to_string()]);
    }

    #[test]
    fn test_invalid_glob() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let channel = Arc::new(Channel::new(4, rt.handle().clone()));
        assert!(ChannelEvent::channel(channel, ChannelOptions::with_pod("[".to_string())).is_err());
    }
}
