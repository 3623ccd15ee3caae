use std::collections::HashMap;
use std::fs;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::domain::{MetricKind, MetricUpdate, SystemInfo};
use crate::ports::{CollectError, Collector};

use super::parser;
use super::ProcfsConfig;

/// Host identity from procfs and /etc
pub struct SystemCollector {
    config: ProcfsConfig,
}

impl SystemCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }

    fn read(&self, path: std::path::PathBuf) -> Option<String> {
        fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn hostname(&self) -> String {
        self.read(self.config.proc_path.join("sys/kernel/hostname"))
            .or_else(|| self.read(self.config.host_path("/etc/hostname")))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn os_release(&self) -> HashMap<String, String> {
        ["/etc/os-release", "/usr/lib/os-release"]
            .iter()
            .find_map(|path| fs::read_to_string(self.config.host_path(path)).ok())
            .map(|content| parser::parse_os_release(&content))
            .unwrap_or_default()
    }

    fn packages(&self) -> u64 {
        fs::read_to_string(self.config.host_path("/var/lib/dpkg/status"))
            .map(|content| parser::count_dpkg_packages(&content))
            .unwrap_or(0)
    }

    fn timezone(&self) -> String {
        if let Some(zone) = self.read(self.config.host_path("/etc/timezone")) {
            return zone;
        }

        let from_link = fs::read_link(self.config.host_path("/etc/localtime"))
            .ok()
            .and_then(|target| {
                let target = target.to_string_lossy().to_string();
                target
                    .split_once("zoneinfo/")
                    .map(|(_, zone)| zone.to_string())
            });

        from_link
            .or_else(|| std::env::var("TZ").ok().filter(|tz| !tz.is_empty()))
            .unwrap_or_else(|| "UTC".to_string())
    }

    /// Container runtime this process runs under, if any
    fn container_type(&self) -> Option<String> {
        if self.config.host_path("/.dockerenv").exists() {
            return Some("docker".to_string());
        }
        if self.config.host_path("/run/.containerenv").exists() {
            return Some("podman".to_string());
        }

        let cgroup = self.read(self.config.proc_path.join("1/cgroup"))?;
        ["kubepods", "docker", "containerd", "lxc"]
            .iter()
            .find(|marker| cgroup.contains(*marker))
            .map(|marker| match *marker {
                "kubepods" => "kubernetes".to_string(),
                other => other.to_string(),
            })
    }
}

#[async_trait]
impl Collector for SystemCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::System
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let uptime_content = fs::read_to_string(self.config.proc_path.join("uptime"))?;
        let uptime = parser::parse_uptime(&uptime_content)?;

        let release = self.os_release();
        let os = release.get("PRETTY_NAME").cloned().unwrap_or_else(|| {
            match (release.get("NAME"), release.get("VERSION_ID")) {
                (Some(name), Some(version)) => format!("{} {}", name, version),
                (Some(name), None) => name.clone(),
                _ => "Linux".to_string(),
            }
        });

        let kernel = self
            .read(self.config.proc_path.join("sys/kernel/osrelease"))
            .map(|release| format!("Linux {}", release))
            .unwrap_or_else(|| "Linux".to_string());

        let container_type = self.container_type();

        Ok(MetricUpdate::System(SystemInfo {
            hostname: self.hostname(),
            os,
            kernel,
            uptime,
            packages: self.packages(),
            location: "Local".to_string(),
            timezone: self.timezone(),
            current_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            distro: release.get("ID").cloned(),
            distro_name: release.get("NAME").cloned(),
            in_container: Some(container_type.is_some()),
            container_type,
        }))
    }
}
