use serde::{Deserialize, Serialize};

use crate::utils;

/// canvas (workspace) id
pub type CanvasId = String;
/// pod id
pub type PodId = String;
/// connection id
pub type ConnectionId = String;

/// Policy governing whether and how an edge fires.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TriggerMode {
    /// Fire on every completion; fan-in over a fixed required-source set.
    #[default]
    Auto,
    /// Fire on every completion; fan-in over a rolling countdown window.
    Direct,
    /// Ask the decision model whether to fire.
    AiDecide,
}

impl TriggerMode {
    /// Modes whose inbound edges take part in fixed-set fan-in.
    pub fn is_fixed_set(&self) -> bool {
        matches!(self, TriggerMode::Auto | TriggerMode::AiDecide)
    }
}

/// Runtime status of a connection.
///
/// `idle -> {queued, waiting, ai-deciding, active} -> idle`, with
/// `ai-deciding -> {ai-approved, ai-rejected, ai-error} -> idle`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Queued,
    Waiting,
    Active,
    AiDeciding,
    AiApproved,
    AiRejected,
    AiError,
}

/// Outcome of the last decision taken for a connection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DecideStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
    Error,
}

/// A directed producer -> consumer edge between two pods.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_pod_id: PodId,
    pub target_pod_id: PodId,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    #[serde(default)]
    pub decide_status: DecideStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decide_reason: Option<String>,
}

impl Connection {
    pub fn new(
        source_pod_id: &str,
        target_pod_id: &str,
        trigger_mode: TriggerMode,
    ) -> Self {
        Self {
            id: utils::uuid(),
            source_pod_id: source_pod_id.to_string(),
            target_pod_id: target_pod_id.to_string(),
            trigger_mode,
            connection_status: ConnectionStatus::Idle,
            decide_status: DecideStatus::None,
            decide_reason: None,
        }
    }
}
