use serde::{Deserialize, Serialize};

/// Container lifecycle status as shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Paused,
    Restarting,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Memory usage of a container in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMemory {
    pub usage: u64,
    pub limit: u64,
}

/// Docker container entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    /// Seconds since the container started, zero when not running
    pub uptime: u64,
    pub cpu: f64,
    pub memory: ContainerMemory,
}

impl DockerContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            status,
            uptime: 0,
            cpu: 0.0,
            memory: ContainerMemory { usage: 0, limit: 0 },
        }
    }

    pub fn with_uptime(mut self, uptime: u64) -> Self {
        self.uptime = uptime;
        self
    }

    pub fn with_usage(mut self, cpu: f64, memory_usage: u64, memory_limit: u64) -> Self {
        self.cpu = cpu;
        self.memory = ContainerMemory {
            usage: memory_usage,
            limit: memory_limit,
        };
        self
    }
}
