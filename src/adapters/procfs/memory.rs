use std::fs;

use async_trait::async_trait;

use crate::domain::{MemoryMetrics, MetricKind, MetricUpdate};
use crate::ports::{CollectError, Collector};

use super::parser;
use super::ProcfsConfig;

/// Memory usage from /proc/meminfo
pub struct MemoryCollector {
    config: ProcfsConfig,
}

impl MemoryCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Memory
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let meminfo_content = fs::read_to_string(self.config.proc_path.join("meminfo"))?;
        let meminfo = parser::parse_meminfo(&meminfo_content)?;

        let total = meminfo.get("MemTotal").copied().unwrap_or(0);
        // Kernels before 3.14 lack MemAvailable
        let available = meminfo.get("MemAvailable").copied().unwrap_or_else(|| {
            ["MemFree", "Buffers", "Cached"]
                .iter()
                .filter_map(|key| meminfo.get(*key))
                .sum()
        });
        let used = total.saturating_sub(available);

        Ok(MetricUpdate::Memory(MemoryMetrics::from_bytes(used, total, available)))
    }
}
