mod memory;

pub use memory::InMemoryMetricsRepository;
