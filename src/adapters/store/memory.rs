use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{
    CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, MetricsSnapshot,
    NetworkHistoryPoint, NetworkMetrics, RollingHistory, StorageDrive, SystemInfo,
    SystemService, TimeSeriesPoint,
};
use crate::ports::MetricStore;

/// Current value plus history, guarded together so readers never see one
/// without the other
struct ChartSlot<T, P> {
    current: Option<T>,
    history: RollingHistory<P>,
}

impl<T, P: Clone> ChartSlot<T, P> {
    fn new(max_points: usize) -> Self {
        Self {
            current: None,
            history: RollingHistory::new(max_points),
        }
    }

    fn set(&mut self, value: T, projection: P) {
        self.history.push(TimeSeriesPoint::now(projection));
        self.current = Some(value);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Volatile in-memory store with one lock per metric kind
pub struct InMemoryMetricsRepository {
    cpu: RwLock<ChartSlot<CpuMetrics, f64>>,
    memory: RwLock<ChartSlot<MemoryMetrics, f64>>,
    network: RwLock<ChartSlot<NetworkMetrics, NetworkHistoryPoint>>,
    docker: RwLock<Option<Vec<DockerContainer>>>,
    ports: RwLock<Option<Vec<ListeningPort>>>,
    storage: RwLock<Option<Vec<StorageDrive>>>,
    services: RwLock<Option<Vec<SystemService>>>,
    system: RwLock<Option<SystemInfo>>,
}

impl InMemoryMetricsRepository {
    pub fn new(max_points: usize) -> Self {
        Self {
            cpu: RwLock::new(ChartSlot::new(max_points)),
            memory: RwLock::new(ChartSlot::new(max_points)),
            network: RwLock::new(ChartSlot::new(max_points)),
            docker: RwLock::new(None),
            ports: RwLock::new(None),
            storage: RwLock::new(None),
            services: RwLock::new(None),
            system: RwLock::new(None),
        }
    }
}

impl MetricStore for InMemoryMetricsRepository {
    fn set_cpu(&self, value: CpuMetrics) {
        let usage = value.usage;
        write(&self.cpu).set(value, usage);
    }

    fn cpu(&self) -> Option<CpuMetrics> {
        read(&self.cpu).current.clone()
    }

    fn cpu_history(&self) -> Vec<TimeSeriesPoint<f64>> {
        read(&self.cpu).history.to_vec()
    }

    fn set_memory(&self, value: MemoryMetrics) {
        let usage = value.usage;
        write(&self.memory).set(value, usage);
    }

    fn memory(&self) -> Option<MemoryMetrics> {
        read(&self.memory).current.clone()
    }

    fn memory_history(&self) -> Vec<TimeSeriesPoint<f64>> {
        read(&self.memory).history.to_vec()
    }

    fn set_network(&self, value: NetworkMetrics) {
        let point = value.history_point();
        write(&self.network).set(value, point);
    }

    fn network(&self) -> Option<NetworkMetrics> {
        read(&self.network).current.clone()
    }

    fn network_history(&self) -> Vec<TimeSeriesPoint<NetworkHistoryPoint>> {
        read(&self.network).history.to_vec()
    }

    fn set_docker(&self, value: Vec<DockerContainer>) {
        *write(&self.docker) = Some(value);
    }

    fn docker(&self) -> Option<Vec<DockerContainer>> {
        read(&self.docker).clone()
    }

    fn set_ports(&self, value: Vec<ListeningPort>) {
        *write(&self.ports) = Some(value);
    }

    fn ports(&self) -> Option<Vec<ListeningPort>> {
        read(&self.ports).clone()
    }

    fn set_storage(&self, value: Vec<StorageDrive>) {
        *write(&self.storage) = Some(value);
    }

    fn storage(&self) -> Option<Vec<StorageDrive>> {
        read(&self.storage).clone()
    }

    fn set_services(&self, value: Vec<SystemService>) {
        *write(&self.services) = Some(value);
    }

    fn services(&self) -> Option<Vec<SystemService>> {
        read(&self.services).clone()
    }

    fn set_system(&self, value: SystemInfo) {
        *write(&self.system) = Some(value);
    }

    fn system(&self) -> Option<SystemInfo> {
        read(&self.system).clone()
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let (cpu, cpu_history) = {
            let slot = read(&self.cpu);
            (slot.current.clone(), slot.history.to_vec())
        };
        let (memory, memory_history) = {
            let slot = read(&self.memory);
            (slot.current.clone(), slot.history.to_vec())
        };
        let (network, network_history) = {
            let slot = read(&self.network);
            (slot.current.clone(), slot.history.to_vec())
        };

        MetricsSnapshot {
            cpu,
            memory,
            docker: self.docker().unwrap_or_default(),
            ports: self.ports().unwrap_or_default(),
            storage: self.storage().unwrap_or_default(),
            network,
            services: self.services().unwrap_or_default(),
            system: self.system(),
            cpu_history,
            memory_history,
            network_history,
        }
    }

    fn max_points(&self) -> usize {
        read(&self.cpu).history.capacity()
    }
}
