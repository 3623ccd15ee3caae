use std::fs;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{CpuMetrics, MetricKind, MetricUpdate};
use crate::ports::{CollectError, Collector};

use super::parser::{self, CpuStat};
use super::ProcfsConfig;

/// CPU usage from consecutive /proc/stat samples
pub struct CpuCollector {
    config: ProcfsConfig,
    last_stat: Mutex<Option<CpuStat>>,
}

impl CpuCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self {
            config,
            last_stat: Mutex::new(None),
        }
    }

    fn sample(&self) -> Result<CpuMetrics, CollectError> {
        let stat_content = fs::read_to_string(self.config.proc_path.join("stat"))?;
        let current = parser::parse_cpu_stat(&stat_content)?;

        let cpuinfo_content = fs::read_to_string(self.config.proc_path.join("cpuinfo"))?;
        let info = parser::parse_cpuinfo(&cpuinfo_content)?;

        // The first sample has no predecessor and reports the average since boot
        let usage = {
            let mut last = self.last_stat.lock().unwrap_or_else(PoisonError::into_inner);
            let usage = current.usage_since(last.as_ref());
            *last = Some(current);
            usage
        };

        Ok(CpuMetrics::new(
            usage,
            info.logical_cores,
            info.physical_cores,
            info.model,
            info.speed,
        ))
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        self.sample().map(MetricUpdate::Cpu)
    }
}
