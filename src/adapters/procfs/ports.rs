use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;

use async_trait::async_trait;

use crate::domain::port::service_name;
use crate::domain::{ListeningPort, MetricKind, MetricUpdate, Protocol};
use crate::ports::{CollectError, Collector};

use super::parser::{self, ListenSocket};
use super::ProcfsConfig;

/// Listening TCP sockets from /proc/net/tcp and /proc/net/tcp6
pub struct PortsCollector {
    config: ProcfsConfig,
}

impl PortsCollector {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }

    fn listeners(&self) -> Result<Vec<ListenSocket>, CollectError> {
        let mut sockets = Vec::new();
        let mut found_table = false;

        for table in ["net/tcp", "net/tcp6"] {
            match fs::read_to_string(self.config.proc_path.join(table)) {
                Ok(content) => {
                    found_table = true;
                    sockets.extend(parser::parse_tcp_listeners(&content)?);
                }
                // IPv6 may be disabled
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if !found_table {
            return Err(CollectError::Parse("no TCP socket tables found".to_string()));
        }
        Ok(sockets)
    }

    /// Map socket inodes to the owning (pid, command). Best effort: other
    /// users' descriptors are unreadable without privileges.
    fn socket_owners(&self) -> HashMap<u64, (u32, String)> {
        let mut owners = HashMap::new();

        let Ok(entries) = fs::read_dir(&self.config.proc_path) else {
            return owners;
        };

        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };

            let mut comm = None;
            for fd in fds.flatten() {
                let Some(inode) = fs::read_link(fd.path())
                    .ok()
                    .and_then(|target| parser::parse_socket_link(&target.to_string_lossy()))
                else {
                    continue;
                };

                let comm = comm.get_or_insert_with(|| {
                    fs::read_to_string(entry.path().join("comm"))
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default()
                });
                owners.entry(inode).or_insert_with(|| (pid, comm.clone()));
            }
        }

        owners
    }
}

#[async_trait]
impl Collector for PortsCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Ports
    }

    async fn collect(&self) -> Result<MetricUpdate, CollectError> {
        let sockets = self.listeners()?;
        let owners = if sockets.is_empty() {
            HashMap::new()
        } else {
            self.socket_owners()
        };

        // One entry per port, ordered by port number
        let mut by_port: BTreeMap<u16, ListeningPort> = BTreeMap::new();
        for socket in sockets {
            let owner = owners.get(&socket.inode).filter(|(_, comm)| !comm.is_empty());

            let entry = by_port.entry(socket.port).or_insert_with(|| ListeningPort {
                port: socket.port,
                protocol: Protocol::Tcp,
                service: service_name(socket.port),
                process: service_name(socket.port),
                pid: None,
            });

            if let (None, Some((pid, comm))) = (entry.pid, owner) {
                entry.pid = Some(*pid);
                entry.process = comm.clone();
            }
        }

        Ok(MetricUpdate::Ports(by_port.into_values().collect()))
    }
}
