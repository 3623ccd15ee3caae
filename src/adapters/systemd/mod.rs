//! Unit state through `systemctl`.
//!
//! Only single-value queries are issued (`is-active`, `show --value`), so no
//! human-oriented output is parsed.

use async_trait::async_trait;
use futures::future::join_all;
use nix::time::{clock_gettime, ClockId};
use tokio::process::Command;
use tracing::debug;

use crate::domain::service::is_valid_service_name;
use crate::domain::{MetricKind, MetricUpdate, ServiceStatus, SystemService};
use crate::ports::{CollectError, Collector};

const SYSTEMCTL: &str = "systemctl";

/// Status of a configured list of systemd units
pub struct ServicesCollector {
    services: Vec<String>,
    program: String,
}

impl ServicesCollector {
    pub fn new(services: Vec<String>) -> Self {
        Self {
            services,
            program: SYSTEMCTL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn systemctl(&self, args: &[&str]) -> Result<String, CollectError> {
        // is-active exits non-zero for inactive units but still prints the state
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CollectError::Command {
                command: format!("{} {}", self.program, args.join(" ")),
                reason: e.to_string(),
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn service(&self, name: &str) -> Result<SystemService, CollectError> {
        // Names become process arguments; never pass anything unexpected
        if !is_valid_service_name(name) {
            return Ok(SystemService {
                name: name.to_string(),
                status: ServiceStatus::Unknown,
                uptime: None,
            });
        }

        let state = self.systemctl(&["is-active", name]).await?;
        let status = match ServiceStatus::from_active_state(&state) {
            // Units that do not exist report "inactive" or nothing at all
            ServiceStatus::Unknown => ServiceStatus::Stopped,
            status => status,
        };

        let uptime = if status == ServiceStatus::Running {
            self.active_for(name).await
        } else {
            None
        };

        Ok(SystemService {
            name: name.to_string(),
            status,
            uptime,
        })
    }

    /// Milliseconds since the unit last entered the active state
    async fn active_for(&self, name: &str) -> Option<u64> {
        let entered = self
            .systemctl(&["show", name, "--property=ActiveEnterTimestampMonotonic", "--value"])
            .await
            .ok()?
            .parse::<u64>()
            .ok()?;

        let now = match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(now) => now,
            Err(e) => {
                debug!(error = %e, "Monotonic clock unavailable");
                return None;
            }
        };
        let now_usec = now.tv_sec() as u64 * 1_000_000 + now.tv_nsec() as u64 / 1_000;

        active_millis(entered, now_usec)
    }
}

/// Elapsed milliseconds between two monotonic microsecond stamps. Zero means never entered.
fn active_millis(entered_usec: u64, now_usec: u64) -> Option<u64> {
    if entered_usec == 0 {
        return None;
    }
    Some(now_usec.saturating_sub(entered_usec) / 1_000)
}

#[async_trait]
impl Collector for ServicesCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Services
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let results = join_all(self.services.iter().map(|name| self.service(name))).await;
        let services = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(MetricUpdate::Services(services))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_millis() {
        assert_eq!(active_millis(0, 5_000_000), None);
        assert_eq!(active_millis(1_000_000, 3_500_000), Some(2_500));
        assert_eq!(active_millis(9_000_000, 1_000_000), Some(0));
    }

    #[tokio::test]
    async fn test_invalid_names_are_not_executed() {
        let collector = ServicesCollector::new(vec!["bad name;".to_string()])
            .with_program("/nonexistent/systemctl");

        let MetricUpdate::Services(services) = collector.collect().await.unwrap() else {
            panic!("expected a services update");
        };
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].status, ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_missing_systemctl_fails_collection() {
        let collector =
            ServicesCollector::new(vec!["sshd".to_string()]).with_program("/nonexistent/systemctl");

        let err = collector.collect().await.unwrap_err();
        assert!(matches!(err, CollectError::Command { .. }));
    }
}
