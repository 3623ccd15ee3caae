use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::ports::CollectError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing field: {0}")]
    MissingField(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

impl From<ParseError> for CollectError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(e) => CollectError::Io(e),
            other => CollectError::Parse(other.to_string()),
        }
    }
}

/// Parse /proc/uptime
pub fn parse_uptime(content: &str) -> ParseResult<u64> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::Parse("Empty uptime file".to_string()))?;

    let uptime_secs = first
        .parse::<f64>()
        .map_err(|e| ParseError::Parse(format!("Invalid uptime value: {}", e)))?;

    Ok(uptime_secs as u64)
}

/// CPU stats from /proc/stat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStat {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStat {
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq + self.steal
    }

    pub fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    /// Busy percentage over the interval since `previous`, or since boot without one
    pub fn usage_since(&self, previous: Option<&CpuStat>) -> f64 {
        let (busy, total) = match previous {
            Some(prev) => (
                self.busy().saturating_sub(prev.busy()),
                self.total().saturating_sub(prev.total()),
            ),
            None => (self.busy(), self.total()),
        };

        if total == 0 {
            return 0.0;
        }
        (busy as f64 / total as f64) * 100.0
    }
}

/// Parse /proc/stat (first line only for aggregate CPU)
pub fn parse_cpu_stat(content: &str) -> ParseResult<CpuStat> {
    let first_line = content
        .lines()
        .next()
        .ok_or_else(|| ParseError::Parse("Empty stat file".to_string()))?;

    if !first_line.starts_with("cpu ") {
        return Err(ParseError::Parse("Missing cpu line".to_string()));
    }

    let parts: Vec<&str> = first_line.split_whitespace().skip(1).collect();
    if parts.len() < 8 {
        return Err(ParseError::Parse("Incomplete cpu stat".to_string()));
    }

    Ok(CpuStat {
        user: parts[0].parse().map_err(|e| ParseError::Parse(format!("user: {}", e)))?,
        nice: parts[1].parse().map_err(|e| ParseError::Parse(format!("nice: {}", e)))?,
        system: parts[2].parse().map_err(|e| ParseError::Parse(format!("system: {}", e)))?,
        idle: parts[3].parse().map_err(|e| ParseError::Parse(format!("idle: {}", e)))?,
        iowait: parts[4].parse().map_err(|e| ParseError::Parse(format!("iowait: {}", e)))?,
        irq: parts[5].parse().map_err(|e| ParseError::Parse(format!("irq: {}", e)))?,
        softirq: parts[6].parse().map_err(|e| ParseError::Parse(format!("softirq: {}", e)))?,
        steal: parts[7].parse().map_err(|e| ParseError::Parse(format!("steal: {}", e)))?,
    })
}

/// Static processor description from /proc/cpuinfo
#[derive(Debug, Clone, PartialEq)]
pub struct CpuInfo {
    pub model: String,
    pub logical_cores: u32,
    pub physical_cores: u32,
    /// GHz, two decimals
    pub speed: f64,
}

pub fn parse_cpuinfo(content: &str) -> ParseResult<CpuInfo> {
    let mut model = None;
    let mut logical = 0u32;
    let mut mhz = None;
    let mut cores = HashSet::new();
    let mut physical_id = String::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "processor" => logical += 1,
            "model name" | "Hardware" if model.is_none() => model = Some(value.to_string()),
            "cpu MHz" if mhz.is_none() => mhz = value.parse::<f64>().ok(),
            "physical id" => physical_id = value.to_string(),
            "core id" => {
                cores.insert((physical_id.clone(), value.to_string()));
            }
            _ => {}
        }
    }

    if logical == 0 {
        return Err(ParseError::MissingField("processor".to_string()));
    }

    Ok(CpuInfo {
        model: model.unwrap_or_else(|| "unknown".to_string()),
        logical_cores: logical,
        physical_cores: if cores.is_empty() { logical } else { cores.len() as u32 },
        speed: mhz.map(|m| (m / 10.0).round() / 100.0).unwrap_or(0.0),
    })
}

/// Parse /proc/meminfo into a map
pub fn parse_meminfo(content: &str) -> ParseResult<HashMap<String, u64>> {
    let mut map = HashMap::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            continue;
        }

        let key = parts[0].trim().to_string();
        let value_str = parts[1].trim().trim_end_matches(" kB");

        if let Ok(value) = value_str.parse::<u64>() {
            map.insert(key, value * 1024); // Convert kB to bytes
        }
    }

    if !map.contains_key("MemTotal") {
        return Err(ParseError::MissingField("MemTotal".to_string()));
    }

    Ok(map)
}

/// Parse /proc/mounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub device: String,
    pub mount_point: String,
    pub filesystem: String,
}

pub fn parse_mounts(content: &str) -> ParseResult<Vec<MountInfo>> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        mounts.push(MountInfo {
            device: parts[0].to_string(),
            mount_point: unescape_mount_path(parts[1]),
            filesystem: parts[2].to_string(),
        });
    }

    Ok(mounts)
}

/// /proc/mounts encodes whitespace in paths as octal escapes
fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Read rx/tx byte counters from /sys/class/net/{interface}/statistics
pub fn parse_net_counters(stats_dir: &Path) -> ParseResult<(u64, u64)> {
    let rx_bytes = fs::read_to_string(stats_dir.join("rx_bytes"))?
        .trim()
        .parse::<u64>()
        .map_err(|e| ParseError::Parse(format!("rx_bytes: {}", e)))?;

    let tx_bytes = fs::read_to_string(stats_dir.join("tx_bytes"))?
        .trim()
        .parse::<u64>()
        .map_err(|e| ParseError::Parse(format!("tx_bytes: {}", e)))?;

    Ok((rx_bytes, tx_bytes))
}

/// A listening socket from /proc/net/tcp{,6}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenSocket {
    pub port: u16,
    pub inode: u64,
}

const TCP_LISTEN: &str = "0A";

/// Parse /proc/net/tcp or /proc/net/tcp6, keeping sockets in the LISTEN state
pub fn parse_tcp_listeners(content: &str) -> ParseResult<Vec<ListenSocket>> {
    let mut sockets = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 || parts[3] != TCP_LISTEN {
            continue;
        }

        let port_hex = parts[1]
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| ParseError::Parse(format!("local address: {}", parts[1])))?;
        let port = u16::from_str_radix(port_hex, 16)
            .map_err(|e| ParseError::Parse(format!("port: {}", e)))?;
        let inode = parts[9]
            .parse()
            .map_err(|e| ParseError::Parse(format!("inode: {}", e)))?;

        sockets.push(ListenSocket { port, inode });
    }

    Ok(sockets)
}

/// Extract the inode from a `/proc/{pid}/fd/*` link target like `socket:[12345]`
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parse /etc/os-release into a map, quotes stripped
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Count installed packages in the dpkg status database
pub fn count_dpkg_packages(content: &str) -> u64 {
    content
        .lines()
        .filter(|line| line.trim_end() == "Status: install ok installed")
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uptime() {
        let content = "12345.67 98765.43\n";
        let uptime = parse_uptime(content).unwrap();
        assert_eq!(uptime, 12345);
    }

    #[test]
    fn test_parse_cpu_stat() {
        let content = "cpu  1000 100 500 10000 200 50 30 0\n";
        let stat = parse_cpu_stat(content).unwrap();
        assert_eq!(stat.user, 1000);
        assert_eq!(stat.system, 500);
        assert_eq!(stat.idle, 10000);
        assert_eq!(stat.iowait, 200);
    }

    #[test]
    fn test_cpu_usage_between_samples() {
        let prev = parse_cpu_stat("cpu  100 0 100 800 0 0 0 0\n").unwrap();
        let next = parse_cpu_stat("cpu  200 0 200 1400 0 0 0 0\n").unwrap();

        // 200 busy out of 800 elapsed
        assert_eq!(next.usage_since(Some(&prev)), 25.0);
        assert_eq!(prev.usage_since(None), 20.0);
        assert_eq!(prev.usage_since(Some(&prev)), 0.0);
    }

    #[test]
    fn test_parse_cpuinfo() {
        let content = "\
processor\t: 0
model name\t: AMD Ryzen 7 5800X
cpu MHz\t\t: 3800.123
physical id\t: 0
core id\t\t: 0

processor\t: 1
model name\t: AMD Ryzen 7 5800X
cpu MHz\t\t: 2200.000
physical id\t: 0
core id\t\t: 0

processor\t: 2
physical id\t: 0
core id\t\t: 1
";
        let info = parse_cpuinfo(content).unwrap();
        assert_eq!(info.model, "AMD Ryzen 7 5800X");
        assert_eq!(info.logical_cores, 3);
        assert_eq!(info.physical_cores, 2);
        assert_eq!(info.speed, 3.8);
    }

    #[test]
    fn test_parse_meminfo_requires_total() {
        let info = parse_meminfo("MemTotal:  16384 kB\nMemAvailable: 8192 kB\n").unwrap();
        assert_eq!(info["MemTotal"], 16384 * 1024);
        assert!(parse_meminfo("Cached: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_mounts_unescapes_spaces() {
        let mounts = parse_mounts("/dev/sdb1 /mnt/my\\040disk ext4 rw 0 0\n").unwrap();
        assert_eq!(mounts[0].mount_point, "/mnt/my disk");
        assert_eq!(mounts[0].filesystem, "ext4");
    }

    #[test]
    fn test_parse_tcp_listeners() {
        let content = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 19321 1 0000000000000000 100 0 0 10 0
   1: 0100007F:1F90 0100007F:D2A4 01 00000000:00000000 00:00000000 00000000  1000        0 55120 1 0000000000000000 20 4 30 10 -1
";
        let sockets = parse_tcp_listeners(content).unwrap();
        assert_eq!(sockets, vec![ListenSocket { port: 22, inode: 19321 }]);

        let v6 = "\
  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000000000000:0050 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20001 1 0000000000000000 100 0 0 10 0
";
        assert_eq!(parse_tcp_listeners(v6).unwrap()[0].port, 80);
    }

    #[test]
    fn test_parse_socket_link() {
        assert_eq!(parse_socket_link("socket:[19321]"), Some(19321));
        assert_eq!(parse_socket_link("pipe:[19321]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn test_parse_os_release() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"24.04\"\nID=ubuntu\n# comment\nPRETTY_NAME=\"Ubuntu 24.04 LTS\"\n";
        let release = parse_os_release(content);
        assert_eq!(release["ID"], "ubuntu");
        assert_eq!(release["PRETTY_NAME"], "Ubuntu 24.04 LTS");
        assert_eq!(release["NAME"], "Ubuntu");
    }

    #[test]
    fn test_count_dpkg_packages() {
        let content = "\
Package: bash
Status: install ok installed

Package: old-thing
Status: deinstall ok config-files

Package: coreutils
Status: install ok installed
";
        assert_eq!(count_dpkg_packages(content), 2);
    }
}
