use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{MetricKind, MetricUpdate};

/// Why a single collection attempt failed. Never fatal: the tick is skipped.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("docker error: {0}")]
    Docker(String),

    #[error("collection timed out after {0:?}")]
    TimedOut(Duration),
}

/// Port for a probe that samples one metric kind
#[async_trait]
pub trait Collector: Send + Sync {
    /// The kind every successful [`Collector::collect`] call produces
    fn kind(&self) -> MetricKind;

    /// Take one sample. Safe to call repeatedly.
    async fn collect(&self) -> Result<MetricUpdate, CollectError>;
}
