#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use podflow::{
    Config, Connection, Engine, EngineBuilder, PodStatus, PodflowError, Result,
    adapter::{DecisionModel, DeliveryRequest, Executor, PodAccessor, Summarizer, Summary},
    events::{Event, Message, TriggerEvent},
    store::{ConnectionPersist, MemStore},
    strategy::TriggerDecision,
};
use tokio::{
    runtime::Handle,
    sync::broadcast::{self, error::RecvError},
};

#[derive(Default)]
pub struct FakePods {
    statuses: Mutex<HashMap<String, PodStatus>>,
    outputs: Mutex<HashMap<String, String>>,
}

impl FakePods {
    pub fn with_pods(ids: &[&str]) -> Arc<Self> {
        let pods = Self::default();
        for id in ids {
            pods.set(id, PodStatus::Idle);
        }
        Arc::new(pods)
    }

    pub fn set(
        &self,
        pod_id: &str,
        status: PodStatus,
    ) {
        self.statuses.lock().unwrap().insert(pod_id.to_string(), status);
    }

    pub fn get(
        &self,
        pod_id: &str,
    ) -> Option<PodStatus> {
        self.statuses.lock().unwrap().get(pod_id).copied()
    }

    pub fn set_output(
        &self,
        pod_id: &str,
        output: &str,
    ) {
        self.outputs.lock().unwrap().insert(pod_id.to_string(), output.to_string());
    }
}

impl PodAccessor for FakePods {
    fn status(
        &self,
        _canvas_id: &str,
        pod_id: &str,
    ) -> Option<PodStatus> {
        self.get(pod_id)
    }

    fn set_status(
        &self,
        _canvas_id: &str,
        pod_id: &str,
        status: PodStatus,
    ) {
        self.set(pod_id, status);
    }

    fn name(
        &self,
        _canvas_id: &str,
        pod_id: &str,
    ) -> Option<String> {
        Some(format!("Pod {}", pod_id.to_uppercase()))
    }

    fn latest_output(
        &self,
        _canvas_id: &str,
        pod_id: &str,
    ) -> Option<String> {
        self.outputs.lock().unwrap().get(pod_id).cloned()
    }
}

/// Summarizes as `summary of <source> #<n>`, counting calls per source.
#[derive(Default)]
pub struct FakeSummarizer {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSummarizer {
    pub fn fail_for(
        &self,
        source_pod_id: &str,
    ) {
        self.failing.lock().unwrap().insert(source_pod_id.to_string());
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        _canvas_id: &str,
        source_pod_id: &str,
        _target_pod_id: &str,
    ) -> Result<Summary> {
        if self.failing.lock().unwrap().contains(source_pod_id) {
            return Err(PodflowError::Summarize(format!("{} has nothing to summarize", source_pod_id)));
        }
        let mut calls = self.calls.lock().unwrap();
        let n = calls.entry(source_pod_id.to_string()).or_default();
        *n += 1;
        Ok(Summary::new(format!("summary of {} #{}", source_pod_id, n)))
    }
}

/// Records every delivery; deliveries to `failing` targets fail.
#[derive(Default)]
pub struct RecordingExecutor {
    deliveries: Mutex<Vec<DeliveryRequest>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

impl RecordingExecutor {
    pub fn deliveries(&self) -> Vec<DeliveryRequest> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn deliveries_to(
        &self,
        target_pod_id: &str,
    ) -> Vec<DeliveryRequest> {
        self.deliveries().into_iter().filter(|d| d.target_pod_id == target_pod_id).collect()
    }

    pub fn fail_for(
        &self,
        target_pod_id: &str,
    ) {
        self.failing.lock().unwrap().insert(target_pod_id.to_string());
    }

    pub fn set_delay(
        &self,
        delay: Duration,
    ) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn deliver(
        &self,
        request: DeliveryRequest,
    ) -> Result<()> {
        let target = request.target_pod_id.clone();
        self.deliveries.lock().unwrap().push(request);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&target) {
            return Err(PodflowError::Delivery(format!("{} crashed", target)));
        }
        Ok(())
    }
}

/// Approves every candidate except those whose source is in `rejecting`.
pub struct StaticModel {
    pub rejecting: HashSet<String>,
}

impl StaticModel {
    pub fn rejecting(sources: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            rejecting: sources.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl DecisionModel for StaticModel {
    async fn decide(
        &self,
        _canvas_id: &str,
        source_pod_id: &str,
        candidates: &[Connection],
    ) -> Result<Vec<TriggerDecision>> {
        Ok(candidates
            .iter()
            .map(|c| {
                if self.rejecting.contains(source_pod_id) {
                    TriggerDecision::reject(&c.id, "output is not relevant for the target")
                } else {
                    TriggerDecision::approve(&c.id)
                }
            })
            .collect())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub pods: Arc<FakePods>,
    pub summarizer: Arc<FakeSummarizer>,
    pub executor: Arc<RecordingExecutor>,
    pub store: Arc<MemStore>,
    pub events: broadcast::Receiver<Event<Message>>,
}

pub fn harness(pods: &[&str]) -> Harness {
    harness_with(pods, None)
}

/// Builds and launches an engine on the current runtime.
pub fn harness_with(
    pods: &[&str],
    model: Option<Arc<dyn DecisionModel>>,
) -> Harness {
    let pods = FakePods::with_pods(pods);
    let summarizer = Arc::new(FakeSummarizer::default());
    let executor = Arc::new(RecordingExecutor::default());
    let store = Arc::new(MemStore::new());

    let mut builder = EngineBuilder::new()
        .config(Config::default())
        .handle(Handle::current())
        .summarizer(summarizer.clone())
        .executor(executor.clone())
        .pods(pods.clone())
        .persist(store.clone() as Arc<dyn ConnectionPersist>);
    if let Some(model) = model {
        builder = builder.decision_model(model);
    }
    let engine = builder.build().unwrap();
    let events = engine.channel().subscribe();
    engine.launch();

    Harness {
        engine,
        pods,
        summarizer,
        executor,
        store,
        events,
    }
}

/// Waits until an event matching `pred` is observed.
pub async fn wait_for(
    events: &mut broadcast::Receiver<Event<Message>>,
    pred: impl Fn(&Message) -> bool,
) -> Message {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(e) if pred(e.inner()) => return e.inner().clone(),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(120), wait).await.expect("expected event was not emitted")
}

pub async fn wait_complete(
    events: &mut broadcast::Receiver<Event<Message>>,
    pod_id: &str,
) -> Message {
    wait_for(events, |m| m.pod_id == pod_id && m.event.is_complete()).await
}

/// Lets spawned pipeline tasks run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn is_complete_ok(m: &Message) -> bool {
    matches!(m.event, TriggerEvent::Complete { success: true, .. })
}

/// Polls `cond` in real time until it holds, for work done off the runtime.
pub async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
