use serde::{Deserialize, Serialize};

/// Status of a pod as reported by the pod status accessor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PodStatus {
    #[default]
    Idle,
    Chatting,
    Summarizing,
    Error,
}

impl PodStatus {
    pub fn is_idle(&self) -> bool {
        *self == PodStatus::Idle
    }
}
