use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Round to one decimal place, the precision the dashboard displays
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert a byte count to gigabytes with one decimal
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round1(bytes as f64 / BYTES_PER_GB)
}

/// Host CPU metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuMetrics {
    pub usage: f64,
    pub cores: u32,
    pub physical_cores: u32,
    pub model: String,
    /// Clock speed in GHz
    pub speed: f64,
}

impl CpuMetrics {
    pub fn new(usage: f64, cores: u32, physical_cores: u32, model: impl Into<String>, speed: f64) -> Self {
        Self {
            usage: round1(usage),
            cores,
            physical_cores,
            model: model.into(),
            speed,
        }
    }
}

/// Host memory metrics, sizes in GB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub usage: f64,
    pub used: f64,
    pub total: f64,
    pub available: f64,
}

impl MemoryMetrics {
    pub fn from_bytes(used_bytes: u64, total_bytes: u64, available_bytes: u64) -> Self {
        let usage = if total_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / total_bytes as f64) * 100.0
        };

        Self {
            usage: round1(usage),
            used: bytes_to_gb(used_bytes),
            total: bytes_to_gb(total_bytes),
            available: bytes_to_gb(available_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_from_bytes() {
        let gb = 1024 * 1024 * 1024;
        let mem = MemoryMetrics::from_bytes(4 * gb, 16 * gb, 12 * gb);
        assert_eq!(mem.usage, 25.0);
        assert_eq!(mem.used, 4.0);
        assert_eq!(mem.total, 16.0);
        assert_eq!(mem.available, 12.0);
    }

    #[test]
    fn test_memory_zero_total() {
        let mem = MemoryMetrics::from_bytes(0, 0, 0);
        assert_eq!(mem.usage, 0.0);
    }

    #[test]
    fn test_cpu_serializes_camel_case() {
        let cpu = CpuMetrics::new(12.345, 8, 4, "Test CPU", 3.2);
        let json = serde_json::to_value(&cpu).unwrap();
        assert_eq!(json["usage"], 12.3);
        assert_eq!(json["physicalCores"], 4);
    }
}
