use std::collections::HashMap;
use std::fs;
use std::net::SocketAddrV4;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use nix::ifaddrs::getifaddrs;
use tracing::debug;

use crate::domain::metrics::round1;
use crate::domain::{InterfaceStatus, MetricKind, MetricUpdate, NetworkInterface, NetworkMetrics};
use crate::ports::{CollectError, Collector};

use super::parser;
use super::ProcfsConfig;

const BYTES_PER_MEGABIT: f64 = 1024.0 * 1024.0 / 8.0;

struct CounterSample {
    at: Instant,
    counters: HashMap<String, (u64, u64)>,
}

/// Bandwidth across physical interfaces, from /sys/class/net byte counters
pub struct NetworkCollector {
    config: ProcfsConfig,
    last: Mutex<Option<CounterSample>>,
}

impl NetworkCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self {
            config,
            last: Mutex::new(None),
        }
    }

    fn sample_at(&self, now: Instant) -> Result<NetworkMetrics, CollectError> {
        let net_class_path = self.config.sys_path.join("class/net");
        let addresses = ipv4_addresses();

        let mut interfaces = Vec::new();
        let mut counters = HashMap::new();

        for entry in fs::read_dir(&net_class_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path();

            // Virtual interfaces (bridges, veths, tunnels) have no backing device
            if name == "lo" || !path.join("device").exists() {
                continue;
            }

            if let Ok(pair) = parser::parse_net_counters(&path.join("statistics")) {
                counters.insert(name.clone(), pair);
            }

            interfaces.push(NetworkInterface {
                ip: addresses.get(&name).cloned().unwrap_or_else(|| "-".to_string()),
                mac: read_trimmed(&path.join("address")).unwrap_or_default(),
                status: match read_trimmed(&path.join("operstate")).as_deref() {
                    Some("up") => InterfaceStatus::Up,
                    _ => InterfaceStatus::Down,
                },
                kind: if path.join("wireless").exists() {
                    "wireless".to_string()
                } else {
                    "wired".to_string()
                },
                name,
            });
        }
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let (download, upload) = match last.as_ref() {
            Some(previous) => rates(previous, &counters, now),
            None => (0.0, 0.0),
        };
        *last = Some(CounterSample { at: now, counters });

        Ok(NetworkMetrics {
            download,
            upload,
            interfaces,
        })
    }
}

/// Mbps since `previous`, counting only interfaces present in both samples
fn rates(previous: &CounterSample, counters: &HashMap<String, (u64, u64)>, now: Instant) -> (f64, f64) {
    let elapsed = now.saturating_duration_since(previous.at).as_secs_f64();
    if elapsed <= 0.0 {
        return (0.0, 0.0);
    }

    let (mut rx, mut tx) = (0u64, 0u64);
    for (name, (rx_now, tx_now)) in counters {
        if let Some((rx_before, tx_before)) = previous.counters.get(name) {
            rx += rx_now.saturating_sub(*rx_before);
            tx += tx_now.saturating_sub(*tx_before);
        }
    }

    let mbps = |bytes: u64| round1(bytes as f64 / elapsed / BYTES_PER_MEGABIT);
    (mbps(rx), mbps(tx))
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// First IPv4 address of every interface
fn ipv4_addresses() -> HashMap<String, String> {
    let mut addresses = HashMap::new();

    let iter = match getifaddrs() {
        Ok(iter) => iter,
        Err(e) => {
            debug!(error = %e, "getifaddrs failed");
            return addresses;
        }
    };

    for ifaddr in iter {
        let Some(ip) = ifaddr
            .address
            .as_ref()
            .and_then(|addr| addr.as_sockaddr_in())
            .map(|sin| SocketAddrV4::from(*sin).ip().to_string())
        else {
            continue;
        };
        addresses.entry(ifaddr.interface_name).or_insert(ip);
    }

    addresses
}

#[async_trait]
impl Collector for NetworkCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Network
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        self.sample_at(Instant::now()).map(MetricUpdate::Network)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::adapters::procfs::testing::FakeRoot;

    fn add_interface(root: &FakeRoot, name: &str, rx: u64, tx: u64, physical: bool) {
        let base = format!("sys/class/net/{name}");
        root.write(&format!("{base}/statistics/rx_bytes"), &format!("{rx}\n"));
        root.write(&format!("{base}/statistics/tx_bytes"), &format!("{tx}\n"));
        root.write(&format!("{base}/operstate"), "up\n");
        root.write(&format!("{base}/address"), "02:42:ac:11:00:02\n");
        if physical {
            root.mkdir(&format!("{base}/device"));
        }
    }

    #[test]
    fn test_rates_between_samples() {
        let root = FakeRoot::new("net");
        add_interface(&root, "eth0", 0, 0, true);
        add_interface(&root, "docker0", 0, 0, false);

        let collector = NetworkCollector::new(root.config());
        let start = Instant::now();

        let first = collector.sample_at(start).unwrap();
        assert_eq!((first.download, first.upload), (0.0, 0.0));
        assert_eq!(first.interfaces.len(), 1);
        assert_eq!(first.interfaces[0].name, "eth0");
        assert_eq!(first.interfaces[0].status, InterfaceStatus::Up);
        assert_eq!(first.interfaces[0].kind, "wired");

        // 2 MiB down and 1 MiB up over two seconds
        add_interface(&root, "eth0", 2 * 1024 * 1024, 1024 * 1024, true);
        add_interface(&root, "docker0", 50 * 1024 * 1024, 0, false);
        let second = collector.sample_at(start + Duration::from_secs(2)).unwrap();
        assert_eq!(second.download, 8.0);
        assert_eq!(second.upload, 4.0);
    }

    #[test]
    fn test_counter_reset_does_not_underflow() {
        let root = FakeRoot::new("net-reset");
        add_interface(&root, "eth0", 5000, 5000, true);

        let collector = NetworkCollector::new(root.config());
        let start = Instant::now();
        collector.sample_at(start).unwrap();

        add_interface(&root, "eth0", 10, 10, true);
        let after = collector.sample_at(start + Duration::from_secs(1)).unwrap();
        assert_eq!((after.download, after.upload), (0.0, 0.0));
    }

    #[test]
    fn test_missing_sysfs_fails() {
        let root = FakeRoot::new("net-missing");
        assert!(NetworkCollector::new(root.config()).sample_at(Instant::now()).is_err());
    }
}
