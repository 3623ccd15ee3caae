use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed,
    Unknown,
}

impl ServiceStatus {
    /// Map a unit's active state (`systemctl is-active`) to a dashboard status
    pub fn from_active_state(state: &str) -> Self {
        match state.trim() {
            "active" | "reloading" | "activating" => Self::Running,
            "failed" => Self::Failed,
            "inactive" | "deactivating" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// Monitored system service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemService {
    pub name: String,
    pub status: ServiceStatus,
    /// Milliseconds since the unit entered the active state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

/// Service names are passed as process arguments, so restrict their alphabet
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '.' | '-'))
}
