pub mod container;
pub mod disk;
pub mod kind;
pub mod message;
pub mod metrics;
pub mod network;
pub mod port;
pub mod series;
pub mod service;
pub mod snapshot;
pub mod system;
pub mod update;

pub use container::{ContainerMemory, ContainerStatus, DockerContainer};
pub use disk::StorageDrive;
pub use kind::{MetricKind, UnknownMetricKind};
pub use message::{
    ChartPayload, CpuPayload, ErrorCode, ErrorPayload, MemoryPayload, NetworkPayload,
    PongPayload, ServerMessage,
};
pub use metrics::{CpuMetrics, MemoryMetrics};
pub use network::{InterfaceStatus, NetworkHistoryPoint, NetworkInterface, NetworkMetrics};
pub use port::{ListeningPort, Protocol};
pub use series::{RollingHistory, TimeSeriesPoint};
pub use service::{ServiceStatus, SystemService};
pub use snapshot::MetricsSnapshot;
pub use system::SystemInfo;
pub use update::MetricUpdate;
