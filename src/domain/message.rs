//! Server-to-client wire messages.
//!
//! Every message is one JSON object `{ "type", "payload", "timestamp" }`.

use chrono::Utc;
use serde::Serialize;

use super::{
    CpuMetrics, DockerContainer, ListeningPort, MemoryMetrics, MetricsSnapshot,
    NetworkHistoryPoint, NetworkMetrics, StorageDrive, SystemInfo, SystemService,
    TimeSeriesPoint,
};

/// Current value of a chartable kind with its history alongside
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload<T, P> {
    #[serde(flatten)]
    pub current: T,
    pub history: Vec<TimeSeriesPoint<P>>,
}

impl<T, P> ChartPayload<T, P> {
    pub fn new(current: T, history: Vec<TimeSeriesPoint<P>>) -> Self {
        Self { current, history }
    }
}

pub type CpuPayload = ChartPayload<CpuMetrics, f64>;
pub type MemoryPayload = ChartPayload<MemoryMetrics, f64>;
pub type NetworkPayload = ChartPayload<NetworkMetrics, NetworkHistoryPoint>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    MessageTooLarge,
    InvalidMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongPayload {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerMessage {
    Initial(Box<MetricsSnapshot>),
    Cpu(CpuPayload),
    Memory(MemoryPayload),
    Docker(Vec<DockerContainer>),
    Ports(Vec<ListeningPort>),
    Storage(Vec<StorageDrive>),
    Network(NetworkPayload),
    Services(Vec<SystemService>),
    System(SystemInfo),
    Pong(PongPayload),
    Error(ErrorPayload),
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    timestamp: i64,
}

impl ServerMessage {
    pub fn pong() -> Self {
        Self::Pong(PongPayload {
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Initial(_) => "initial",
            Self::Cpu(_) => "cpu",
            Self::Memory(_) => "memory",
            Self::Docker(_) => "docker",
            Self::Ports(_) => "ports",
            Self::Storage(_) => "storage",
            Self::Network(_) => "network",
            Self::Services(_) => "services",
            Self::System(_) => "system",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }

    /// Serialize with the current time as the envelope timestamp
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        self.encode_at(Utc::now().timestamp_millis())
    }

    pub fn encode_at(&self, timestamp: i64) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Envelope {
            message: self,
            timestamp,
        })
    }
}
