//! Error types for Podflow.
//!
//! All errors in Podflow are represented by the `PodflowError` enum.
//! Most of them never leave the pipeline: a failing edge is logged and
//! abandoned, while the variants still surface from the store, config and
//! engine entry points.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Podflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum PodflowError {
    /// Engine-level errors (startup, shutdown, runtime).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// A referenced pod or connection no longer exists.
    #[error("{0} not found")]
    NotFound(String),

    /// Connection definition errors (duplicate edge, bad endpoints).
    #[error("{0}")]
    Connection(String),

    /// The decision model failed to produce a verdict.
    #[error("decision failed: {0}")]
    Decision(String),

    /// The summarizer failed to condense a pod's output.
    #[error("summarize failed: {0}")]
    Summarize(String),

    /// The execution adapter reported a failed delivery.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<PodflowError> for String {
    fn from(val: PodflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for PodflowError {
    fn from(error: std::io::Error) -> Self {
        PodflowError::IoError(error.to_string())
    }
}

impl From<PodflowError> for std::io::Error {
    fn from(val: PodflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for PodflowError {
    fn from(_: FromUtf8Error) -> Self {
        PodflowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for PodflowError {
    fn from(error: serde_json::Error) -> Self {
        PodflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for PodflowError {
    fn from(error: toml::de::Error) -> Self {
        PodflowError::Config(error.to_string())
    }
}
