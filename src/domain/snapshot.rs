use serde::{Deserialize, Serialize};

use super::{
    CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, NetworkHistoryPoint,
    NetworkMetrics, StorageDrive, SystemInfo, SystemService, TimeSeriesPoint,
};

/// Every current value and every history, as sent to a newly joined client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cpu: Option<CpuMetrics>,
    pub memory: Option<MemoryMetrics>,
    pub docker: Vec<DockerContainer>,
    pub ports: Vec<ListeningPort>,
    pub storage: Vec<StorageDrive>,
    pub network: Option<NetworkMetrics>,
    pub services: Vec<SystemService>,
    pub system: Option<SystemInfo>,
    pub cpu_history: Vec<TimeSeriesPoint<f64>>,
    pub memory_history: Vec<TimeSeriesPoint<f64>>,
    pub network_history: Vec<TimeSeriesPoint<NetworkHistoryPoint>>,
}
