pub mod collector;
pub mod metric_store;

pub use collector::{CollectError, Collector};
pub use metric_store::MetricStore;
