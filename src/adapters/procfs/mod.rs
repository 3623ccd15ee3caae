mod cpu;
mod memory;
mod network;
mod parser;
mod ports;
mod storage;
mod system;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

pub use cpu::CpuCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use ports::PortsCollector;
pub use storage::StorageCollector;
pub use system::SystemCollector;

use crate::ports::Collector;

/// Configuration for procfs paths (useful for Docker mounts)
#[derive(Debug, Clone)]
pub struct ProcfsConfig {
    pub proc_path: PathBuf,
    pub sys_path: PathBuf,
    /// Host filesystem root for /etc, /var and mount points
    pub root_path: PathBuf,
}

impl ProcfsConfig {
    pub fn new(proc_path: impl Into<PathBuf>, sys_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            root_path: PathBuf::from("/"),
        }
    }

    pub fn host() -> Self {
        Self::new("/proc", "/sys")
    }

    pub fn with_root(mut self, root_path: impl Into<PathBuf>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Resolve an absolute host path against `root_path`
    pub fn host_path(&self, absolute: &str) -> PathBuf {
        self.root_path.join(absolute.trim_start_matches('/'))
    }
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self::host()
    }
}

/// Factory for every collector backed by kernel pseudo-files
#[derive(Debug, Clone)]
pub struct ProcfsAdapter {
    config: ProcfsConfig,
}

impl ProcfsAdapter {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }

    /// cpu, memory, network, storage, ports and system collectors
    pub fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![
            Arc::new(CpuCollector::new(self.config.clone())),
            Arc::new(MemoryCollector::new(self.config.clone())),
            Arc::new(NetworkCollector::new(self.config.clone())),
            Arc::new(StorageCollector::new(self.config.clone())),
            Arc::new(PortsCollector::new(self.config.clone())),
            Arc::new(SystemCollector::new(self.config.clone())),
        ]
    }
}
