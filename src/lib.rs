//! # Podflow
//!
//! Podflow is an embeddable trigger orchestration engine for graphs of
//! AI-agent pods. Pods are wired by directed connections; when a pod
//! finishes producing output the engine decides, per outgoing connection,
//! whether to forward a condensed artifact downstream, how to merge artifacts
//! when several upstream pods feed the same target, and how to serialize
//! deliveries to a target that is already busy.
//!
//! ## Core Features
//!
//! - **Trigger modes**: `auto` fires unconditionally, `direct` batches
//!   near-simultaneous arrivals in a countdown window, `ai-decide` asks a
//!   decision model
//! - **Fan-in**: fixed-set aggregation for `auto`/`ai-decide` targets with
//!   several sources, countdown aggregation for `direct` targets
//! - **Delivery queue**: at most one delivery in flight per target, FIFO
//! - **Event-Driven**: every state transition is broadcast on the event channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use podflow::{EngineBuilder, TriggerMode};
//!
//! let engine = EngineBuilder::new()
//!     .summarizer(summarizer)
//!     .executor(executor)
//!     .pods(pods)
//!     .build()?;
//! engine.launch();
//!
//! engine.create_connection("canvas", "writer", "reviewer", TriggerMode::Auto)?;
//! engine.on_pod_complete("canvas", "writer")?;
//! ```

pub mod adapter;
pub mod aggregate;
mod builder;
mod common;
mod config;
pub mod delivery;
pub mod dispatcher;
mod engine;
mod error;
pub mod events;
mod model;
mod runtime;
pub mod store;
pub mod strategy;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::{AggregateConfig, ChannelConfig, Config};
pub use engine::Engine;
pub use error::PodflowError;
pub use model::*;
pub use runtime::{Channel, ChannelEvent, ChannelOptions, StatusBoard};

/// Result type alias for podflow operations.
pub type Result<T> = std::result::Result<T, PodflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
