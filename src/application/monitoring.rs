use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::broadcast::Broadcaster;
use crate::domain::{
    CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, MetricKind, MetricsSnapshot,
    NetworkHistoryPoint, NetworkMetrics, StorageDrive, SystemInfo, SystemService,
    TimeSeriesPoint,
};
use crate::ports::MetricStore;

/// Liveness report for `/health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    /// Host uptime in seconds, 0 until system info has been collected
    pub uptime: u64,
    pub live_subscriber_count: usize,
    pub timestamp: i64,
}

/// CPU and memory with their histories
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesView {
    pub cpu: Option<CpuMetrics>,
    pub memory: Option<MemoryMetrics>,
    pub cpu_history: Vec<TimeSeriesPoint<f64>>,
    pub memory_history: Vec<TimeSeriesPoint<f64>>,
}

/// Latest network sample flattened next to its history
#[derive(Debug, Clone, Serialize)]
pub struct NetworkView {
    #[serde(flatten)]
    pub current: Option<NetworkMetrics>,
    pub history: Vec<TimeSeriesPoint<NetworkHistoryPoint>>,
}

/// Read-only query surface over the metrics repository
#[derive(Clone)]
pub struct MonitoringService {
    store: Arc<dyn MetricStore>,
    broadcaster: Broadcaster,
}

impl MonitoringService {
    pub fn new(store: Arc<dyn MetricStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok",
            uptime: self.store.system().map(|s| s.uptime).unwrap_or(0),
            live_subscriber_count: self.broadcaster.count(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.store.snapshot()
    }

    /// Current value of `kind`, `None` before its first successful sample
    pub fn current(&self, kind: MetricKind) -> Option<Value> {
        self.store.current(kind)
    }

    /// History of `kind`, `None` if the kind keeps no history
    pub fn history(&self, kind: MetricKind) -> Option<Value> {
        self.store.history(kind)
    }

    pub fn system_info(&self) -> Option<SystemInfo> {
        self.store.system()
    }

    pub fn resources(&self) -> ResourcesView {
        ResourcesView {
            cpu: self.store.cpu(),
            memory: self.store.memory(),
            cpu_history: self.store.cpu_history(),
            memory_history: self.store.memory_history(),
        }
    }

    pub fn network(&self) -> NetworkView {
        NetworkView {
            current: self.store.network(),
            history: self.store.network_history(),
        }
    }

    pub fn containers(&self) -> Vec<DockerContainer> {
        self.store.docker().unwrap_or_default()
    }

    pub fn drives(&self) -> Vec<StorageDrive> {
        self.store.storage().unwrap_or_default()
    }

    pub fn services(&self) -> Vec<SystemService> {
        self.store.services().unwrap_or_default()
    }

    pub fn ports(&self) -> Vec<ListeningPort> {
        self.store.ports().unwrap_or_default()
    }
}
