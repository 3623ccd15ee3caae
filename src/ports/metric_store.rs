use serde::Serialize;
use serde_json::Value;

use crate::domain::{
    ChartPayload, CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, MetricKind,
    MetricUpdate, MetricsSnapshot, NetworkHistoryPoint, NetworkMetrics, ServerMessage,
    StorageDrive, SystemInfo, SystemService, TimeSeriesPoint,
};

/// Port for the latest value and rolling history of every metric kind.
///
/// Each kind is written by exactly one scheduler task. Implementations must
/// apply a chartable kind's value and history append as one unit.
pub trait MetricStore: Send + Sync {
    fn set_cpu(&self, value: CpuMetrics);
    fn cpu(&self) -> Option<CpuMetrics>;
    fn cpu_history(&self) -> Vec<TimeSeriesPoint<f64>>;

    fn set_memory(&self, value: MemoryMetrics);
    fn memory(&self) -> Option<MemoryMetrics>;
    fn memory_history(&self) -> Vec<TimeSeriesPoint<f64>>;

    fn set_network(&self, value: NetworkMetrics);
    fn network(&self) -> Option<NetworkMetrics>;
    fn network_history(&self) -> Vec<TimeSeriesPoint<NetworkHistoryPoint>>;

    fn set_docker(&self, value: Vec<DockerContainer>);
    fn docker(&self) -> Option<Vec<DockerContainer>>;

    fn set_ports(&self, value: Vec<ListeningPort>);
    fn ports(&self) -> Option<Vec<ListeningPort>>;

    fn set_storage(&self, value: Vec<StorageDrive>);
    fn storage(&self) -> Option<Vec<StorageDrive>>;

    fn set_services(&self, value: Vec<SystemService>);
    fn services(&self) -> Option<Vec<SystemService>>;

    fn set_system(&self, value: SystemInfo);
    fn system(&self) -> Option<SystemInfo>;

    /// Copy of every current value and history, each slot read once
    fn snapshot(&self) -> MetricsSnapshot;

    /// History capacity shared by all chartable kinds
    fn max_points(&self) -> usize;

    /// Store a collection result and build the message that announces it
    fn record(&self, update: MetricUpdate) -> ServerMessage {
        match update {
            MetricUpdate::Cpu(value) => {
                self.set_cpu(value.clone());
                ServerMessage::Cpu(ChartPayload::new(value, self.cpu_history()))
            }
            MetricUpdate::Memory(value) => {
                self.set_memory(value.clone());
                ServerMessage::Memory(ChartPayload::new(value, self.memory_history()))
            }
            MetricUpdate::Network(value) => {
                self.set_network(value.clone());
                ServerMessage::Network(ChartPayload::new(value, self.network_history()))
            }
            MetricUpdate::Docker(value) => {
                self.set_docker(value.clone());
                ServerMessage::Docker(value)
            }
            MetricUpdate::Ports(value) => {
                self.set_ports(value.clone());
                ServerMessage::Ports(value)
            }
            MetricUpdate::Storage(value) => {
                self.set_storage(value.clone());
                ServerMessage::Storage(value)
            }
            MetricUpdate::Services(value) => {
                self.set_services(value.clone());
                ServerMessage::Services(value)
            }
            MetricUpdate::System(value) => {
                self.set_system(value.clone());
                ServerMessage::System(value)
            }
        }
    }

    /// Current value of any kind as JSON, `None` before the first sample
    fn current(&self, kind: MetricKind) -> Option<Value> {
        match kind {
            MetricKind::Cpu => to_json(self.cpu()),
            MetricKind::Memory => to_json(self.memory()),
            MetricKind::Docker => to_json(self.docker()),
            MetricKind::Ports => to_json(self.ports()),
            MetricKind::Storage => to_json(self.storage()),
            MetricKind::Network => to_json(self.network()),
            MetricKind::Services => to_json(self.services()),
            MetricKind::System => to_json(self.system()),
        }
    }

    /// History of a chartable kind as JSON, `None` for kinds without history
    fn history(&self, kind: MetricKind) -> Option<Value> {
        match kind {
            MetricKind::Cpu => to_json(Some(self.cpu_history())),
            MetricKind::Memory => to_json(Some(self.memory_history())),
            MetricKind::Network => to_json(Some(self.network_history())),
            MetricKind::Docker
            | MetricKind::Ports
            | MetricKind::Storage
            | MetricKind::Services
            | MetricKind::System => None,
        }
    }
}

fn to_json<T: Serialize>(value: Option<T>) -> Option<Value> {
    value.and_then(|v| serde_json::to_value(v).ok())
}
