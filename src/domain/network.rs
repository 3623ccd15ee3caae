use serde::{Deserialize, Serialize};

/// Operational state of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    Up,
    Down,
}

/// Network interface entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub ip: String,
    pub mac: String,
    pub status: InterfaceStatus,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Aggregate bandwidth (Mbps) plus the interface list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub download: f64,
    pub upload: f64,
    pub interfaces: Vec<NetworkInterface>,
}

impl NetworkMetrics {
    pub fn history_point(&self) -> NetworkHistoryPoint {
        NetworkHistoryPoint {
            download: self.download,
            upload: self.upload,
        }
    }
}

/// Projection of [`NetworkMetrics`] kept in history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkHistoryPoint {
    pub download: f64,
    pub upload: f64,
}
