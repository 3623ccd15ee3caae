mod collector;

pub use collector::DockerCollector;
