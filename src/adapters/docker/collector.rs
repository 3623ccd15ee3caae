use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::StreamExt;
use tracing::debug;

use crate::domain::metrics::round1;
use crate::domain::{ContainerStatus, DockerContainer, MetricKind, MetricUpdate};
use crate::ports::{CollectError, Collector};

/// Container list and resource usage from the Docker Engine API
pub struct DockerCollector {
    client: Docker,
}

struct ContainerUsage {
    cpu: f64,
    memory_usage: u64,
    memory_limit: u64,
}

impl DockerCollector {
    pub fn new() -> Result<Self, CollectError> {
        let client = Docker::connect_with_local_defaults().map_err(docker_error)?;
        Ok(Self { client })
    }

    fn map_status(state: Option<&str>) -> ContainerStatus {
        match state {
            Some("running") => ContainerStatus::Running,
            Some("paused") => ContainerStatus::Paused,
            Some("restarting") => ContainerStatus::Restarting,
            _ => ContainerStatus::Stopped,
        }
    }

    fn parse_container_name(names: &Option<Vec<String>>) -> String {
        names
            .as_ref()
            .and_then(|n| n.first())
            .map(|s| s.trim_start_matches('/').to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Seconds since `started_at` (RFC 3339), zero if unparseable
    fn uptime_since(started_at: &str, now: DateTime<Utc>) -> u64 {
        DateTime::parse_from_rfc3339(started_at)
            .map(|started| (now - started.with_timezone(&Utc)).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }

    /// Container CPU share in percent of one core, as `docker stats` reports it
    fn cpu_percent(cpu_total: u64, precpu_total: u64, system: u64, presystem: u64, online_cpus: u64) -> f64 {
        let cpu_delta = cpu_total as f64 - precpu_total as f64;
        let system_delta = system as f64 - presystem as f64;

        if system_delta > 0.0 && cpu_delta > 0.0 {
            round1((cpu_delta / system_delta) * online_cpus.max(1) as f64 * 100.0)
        } else {
            0.0
        }
    }

    async fn usage(&self, id: &str) -> Result<ContainerUsage, CollectError> {
        // Not one-shot: the daemon waits for a second sample so precpu is populated
        let mut stream = self.client.stats(
            id,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );

        let stats = stream
            .next()
            .await
            .ok_or_else(|| CollectError::Docker(format!("no stats for {}", id)))?
            .map_err(docker_error)?;

        let cpu = Self::cpu_percent(
            stats.cpu_stats.cpu_usage.total_usage,
            stats.precpu_stats.cpu_usage.total_usage,
            stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            stats.cpu_stats.online_cpus.unwrap_or(1),
        );

        let memory_usage = stats.memory_stats.usage.unwrap_or(0);
        let memory_limit = stats.memory_stats.limit.unwrap_or(memory_usage);

        Ok(ContainerUsage {
            cpu,
            memory_usage,
            memory_limit,
        })
    }

    async fn started_at(&self, id: &str) -> Option<String> {
        self.client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .ok()
            .and_then(|inspect| inspect.state)
            .and_then(|state| state.started_at)
    }

    /// Fill in uptime and usage for a running container. Failures leave zeros.
    async fn enrich(&self, container: DockerContainer) -> DockerContainer {
        if !container.status.is_running() {
            return container;
        }

        let (started_at, usage) = tokio::join!(self.started_at(&container.id), self.usage(&container.id));

        let mut container = match started_at {
            Some(started_at) => {
                let uptime = Self::uptime_since(&started_at, Utc::now());
                container.with_uptime(uptime)
            }
            None => container,
        };

        match usage {
            Ok(usage) => {
                container = container.with_usage(usage.cpu, usage.memory_usage, usage.memory_limit);
            }
            Err(e) => debug!(container = %container.name, error = %e, "Container stats unavailable"),
        }

        container
    }
}

fn docker_error(err: bollard::errors::Error) -> CollectError {
    CollectError::Docker(err.to_string())
}

#[async_trait]
impl Collector for DockerCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Docker
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let options = Some(ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        });

        let summaries = self.client.list_containers(options).await.map_err(docker_error)?;

        let containers = summaries.into_iter().map(|summary| {
            let status = Self::map_status(summary.state.as_deref());
            DockerContainer::new(
                summary.id.unwrap_or_default(),
                Self::parse_container_name(&summary.names),
                summary.image.unwrap_or_else(|| "unknown".to_string()),
                status,
            )
        });

        // Stats calls block for about a second each, so run them together
        let containers = join_all(containers.map(|c| self.enrich(c))).await;

        Ok(MetricUpdate::Docker(containers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DockerCollector::map_status(Some("running")), ContainerStatus::Running);
        assert_eq!(DockerCollector::map_status(Some("paused")), ContainerStatus::Paused);
        assert_eq!(DockerCollector::map_status(Some("restarting")), ContainerStatus::Restarting);
        assert_eq!(DockerCollector::map_status(Some("exited")), ContainerStatus::Stopped);
        assert_eq!(DockerCollector::map_status(Some("created")), ContainerStatus::Stopped);
        assert_eq!(DockerCollector::map_status(None), ContainerStatus::Stopped);
    }

    #[test]
    fn test_container_name() {
        let names = Some(vec!["/web".to_string(), "/alias".to_string()]);
        assert_eq!(DockerCollector::parse_container_name(&names), "web");
        assert_eq!(DockerCollector::parse_container_name(&None), "unknown");
    }

    #[test]
    fn test_cpu_percent() {
        // A quarter of the system delta on 4 cpus is one full core
        assert_eq!(DockerCollector::cpu_percent(250, 0, 1000, 0, 4), 100.0);
        assert_eq!(DockerCollector::cpu_percent(100, 100, 1000, 0, 4), 0.0);
        assert_eq!(DockerCollector::cpu_percent(100, 0, 0, 0, 4), 0.0);
    }

    #[test]
    fn test_uptime_since() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(DockerCollector::uptime_since("2024-05-01T11:00:00.123456789Z", now), 3599);
        assert_eq!(DockerCollector::uptime_since("garbage", now), 0);
    }
}
