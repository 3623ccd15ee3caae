use serde::{Deserialize, Serialize};

/// Operating system identity and host information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
    /// Host uptime in seconds
    pub uptime: u64,
    pub packages: u64,
    pub location: String,
    pub timezone: String,
    pub current_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_container: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_type: Option<String>,
}
