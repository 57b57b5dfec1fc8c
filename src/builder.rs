use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Engine, PodflowError, Result,
    adapter::{DecisionModel, Executor, NoDecisionModel, PodAccessor, Summarizer},
    dispatcher::Collaborators,
    store::{ConnectionPersist, FileStore},
};

/// Assembles an [`Engine`] from a config and its collaborators.
///
/// The summarizer, executor and pod accessor are required. Without a
/// decision model every `ai-decide` edge ends in `error`; without a persist
/// backend connections are written under `config.data_dir`.
#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    rt: Option<Arc<Runtime>>,
    handle: Option<Handle>,
    summarizer: Option<Arc<dyn Summarizer>>,
    executor: Option<Arc<dyn Executor>>,
    decision_model: Option<Arc<dyn DecisionModel>>,
    pods: Option<Arc<dyn PodAccessor>>,
    persist: Option<Arc<dyn ConnectionPersist>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.config.async_worker_thread_number = n;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Spawns engine tasks on an existing runtime without owning it.
    pub fn handle(
        mut self,
        handle: Handle,
    ) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn summarizer(
        mut self,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn executor(
        mut self,
        executor: Arc<dyn Executor>,
    ) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn decision_model(
        mut self,
        decision_model: Arc<dyn DecisionModel>,
    ) -> Self {
        self.decision_model = Some(decision_model);
        self
    }

    pub fn pods(
        mut self,
        pods: Arc<dyn PodAccessor>,
    ) -> Self {
        self.pods = Some(pods);
        self
    }

    pub fn persist(
        mut self,
        persist: Arc<dyn ConnectionPersist>,
    ) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        self.config.validate()?;

        let collaborators = Collaborators {
            summarizer: self.summarizer.clone().ok_or_else(|| PodflowError::Config("a summarizer is required".to_string()))?,
            executor: self.executor.clone().ok_or_else(|| PodflowError::Config("an executor is required".to_string()))?,
            pods: self.pods.clone().ok_or_else(|| PodflowError::Config("a pod accessor is required".to_string()))?,
        };
        let decision_model: Arc<dyn DecisionModel> = match &self.decision_model {
            Some(model) => model.clone(),
            None => Arc::new(NoDecisionModel),
        };
        let persist: Arc<dyn ConnectionPersist> = match &self.persist {
            Some(persist) => persist.clone(),
            None => Arc::new(FileStore::new(&self.config.data_dir)),
        };

        let (handle, rt) = match (&self.rt, &self.handle) {
            (Some(rt), _) => (rt.handle().clone(), Some(rt.clone())),
            (None, Some(handle)) => (handle.clone(), None),
            (None, None) => match Handle::try_current() {
                Ok(handle) => (handle, None),
                Err(_) => {
                    let rt = Arc::new(Builder::new_multi_thread().worker_threads(self.config.async_worker_thread_number.into()).enable_all().build()?);
                    (rt.handle().clone(), Some(rt))
                }
            },
        };

        Ok(Engine::new(&self.config, handle, rt, collaborators, decision_model, persist))
    }
}
