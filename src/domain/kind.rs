use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of metric categories the dashboard samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Docker,
    Ports,
    Storage,
    Network,
    Services,
    System,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Docker,
        MetricKind::Ports,
        MetricKind::Storage,
        MetricKind::Network,
        MetricKind::Services,
        MetricKind::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Docker => "docker",
            Self::Ports => "ports",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Services => "services",
            Self::System => "system",
        }
    }

    /// Whether the repository keeps a rolling history for this kind
    pub fn is_chartable(&self) -> bool {
        matches!(self, Self::Cpu | Self::Memory | Self::Network)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric kind: {0}")]
pub struct UnknownMetricKind(pub String);

impl FromStr for MetricKind {
    type Err = UnknownMetricKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMetricKind(s.to_string()))
    }
}
