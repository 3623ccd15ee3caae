use super::{
    CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, MetricKind, NetworkMetrics,
    StorageDrive, SystemInfo, SystemService,
};

/// One successful collection result, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Cpu(CpuMetrics),
    Memory(MemoryMetrics),
    Docker(Vec<DockerContainer>),
    Ports(Vec<ListeningPort>),
    Storage(Vec<StorageDrive>),
    Network(NetworkMetrics),
    Services(Vec<SystemService>),
    System(SystemInfo),
}

impl MetricUpdate {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Cpu(_) => MetricKind::Cpu,
            Self::Memory(_) => MetricKind::Memory,
            Self::Docker(_) => MetricKind::Docker,
            Self::Ports(_) => MetricKind::Ports,
            Self::Storage(_) => MetricKind::Storage,
            Self::Network(_) => MetricKind::Network,
            Self::Services(_) => MetricKind::Services,
            Self::System(_) => MetricKind::System,
        }
    }
}
