use serde::{Deserialize, Serialize};

use super::metrics::{bytes_to_gb, round1};

/// Mounted filesystem with usage information, sizes in GB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDrive {
    pub device: String,
    pub mount_point: String,
    pub filesystem: String,
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub usage_percent: f64,
}

impl StorageDrive {
    pub fn from_bytes(
        device: String,
        mount_point: String,
        filesystem: String,
        total_bytes: u64,
        used_bytes: u64,
    ) -> Self {
        let usage_percent = if total_bytes == 0 {
            0.0
        } else {
            (used_bytes as f64 / total_bytes as f64) * 100.0
        };

        Self {
            device,
            mount_point,
            filesystem,
            total: bytes_to_gb(total_bytes),
            used: bytes_to_gb(used_bytes),
            available: bytes_to_gb(total_bytes.saturating_sub(used_bytes)),
            usage_percent: round1(usage_percent),
        }
    }
}
