pub mod docker;
pub mod procfs;
pub mod store;
pub mod systemd;

pub use docker::DockerCollector;
pub use procfs::{ProcfsAdapter, ProcfsConfig};
pub use store::InMemoryMetricsRepository;
pub use systemd::ServicesCollector;
