use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::service::is_valid_service_name;
use crate::domain::MetricKind;

const PREFIX: &str = "PULSEDASH_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

const DEFAULT_SERVICES: [&str; 8] = [
    "sshd",
    "nginx",
    "docker",
    "postgresql",
    "redis",
    "systemd-resolved",
    "firewalld",
    "acpid",
];

/// One rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration ({} field(s))", .0.len())]
    Invalid(Vec<FieldError>),
}

impl ConfigError {
    /// Every rejected field, empty for file errors
    pub fn fields(&self) -> &[FieldError] {
        match self {
            ConfigError::Invalid(errors) => errors,
            ConfigError::File { .. } | ConfigError::Toml(_) => &[],
        }
    }
}

/// Collection period per metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub cpu: Duration,
    pub memory: Duration,
    pub network: Duration,
    pub docker: Duration,
    pub storage: Duration,
    pub services: Duration,
    pub ports: Duration,
    pub system: Duration,
}

impl Intervals {
    pub fn for_kind(&self, kind: MetricKind) -> Duration {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::Network => self.network,
            MetricKind::Docker => self.docker,
            MetricKind::Storage => self.storage,
            MetricKind::Services => self.services,
            MetricKind::Ports => self.ports,
            MetricKind::System => self.system,
        }
    }
}

/// (default, floor) in milliseconds
fn interval_bounds(kind: MetricKind) -> (u64, u64) {
    match kind {
        MetricKind::Cpu => (2_000, 500),
        MetricKind::Memory => (3_000, 500),
        MetricKind::Network => (2_000, 500),
        MetricKind::Docker => (5_000, 1_000),
        MetricKind::Storage => (30_000, 5_000),
        MetricKind::Services => (10_000, 1_000),
        MetricKind::Ports => (10_000, 1_000),
        MetricKind::System => (60_000, 10_000),
    }
}

/// Values from the optional TOML file. Environment variables take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u64>,
    pub log_level: Option<String>,
    pub intervals: FileIntervals,
    pub history_max_points: Option<u64>,
    pub ws_max_payload: Option<u64>,
    pub max_connections: Option<u64>,
    pub max_connections_per_ip: Option<u64>,
    pub message_rate_limit: Option<u64>,
    pub message_rate_window: Option<u64>,
    pub max_message_size: Option<u64>,
    pub collector_timeout: Option<u64>,
    pub trust_proxy: Option<bool>,
    pub static_dir: Option<PathBuf>,
    pub proc_path: Option<PathBuf>,
    pub sys_path: Option<PathBuf>,
    pub services: Option<Vec<String>>,
}

/// `[intervals]` table, milliseconds per kind
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileIntervals {
    pub cpu: Option<u64>,
    pub memory: Option<u64>,
    pub network: Option<u64>,
    pub docker: Option<u64>,
    pub storage: Option<u64>,
    pub services: Option<u64>,
    pub ports: Option<u64>,
    pub system: Option<u64>,
}

impl FileIntervals {
    fn get(&self, kind: MetricKind) -> Option<u64> {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::Network => self.network,
            MetricKind::Docker => self.docker,
            MetricKind::Storage => self.storage,
            MetricKind::Services => self.services,
            MetricKind::Ports => self.ports,
            MetricKind::System => self.system,
        }
    }
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub intervals: Intervals,
    pub history_max_points: usize,
    pub ws_max_payload: usize,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub message_rate_limit: u32,
    pub message_rate_window: Duration,
    pub max_message_size: usize,
    /// `None` lets a collector run as long as it needs
    pub collector_timeout: Option<Duration>,
    pub trust_proxy: bool,
    pub static_dir: PathBuf,
    pub proc_path: PathBuf,
    pub sys_path: PathBuf,
    pub services: Vec<String>,
}

impl Config {
    /// Read `PULSEDASH_*` variables, layered over the file named by `PULSEDASH_CONFIG`
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| env::var(key).ok();

        let file = match lookup("PULSEDASH_CONFIG") {
            Some(path) if !path.trim().is_empty() => FileConfig::load(Path::new(path.trim()))?,
            _ => FileConfig::default(),
        };

        Self::from_sources(lookup, &file)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_sources(lookup, &FileConfig::default())
    }

    pub fn from_sources<F>(lookup: F, file: &FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut r = Resolver {
            lookup: &lookup,
            errors: Vec::new(),
        };

        let host = r.parsed("HOST", file.host.clone(), "0.0.0.0".to_string());
        let host = host.parse::<IpAddr>().unwrap_or_else(|_| {
            r.reject("HOST", format!("`{host}` is not an IP address"));
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        let port = r.ranged("PORT", file.port, 3001, 1, 65_535) as u16;

        let log_level = r
            .parsed("LOG_LEVEL", file.log_level.clone(), "info".to_string())
            .to_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            r.reject("LOG_LEVEL", format!("must be one of {}", LOG_LEVELS.join(", ")));
        }

        let mut interval = |kind: MetricKind| {
            let (default, floor) = interval_bounds(kind);
            let name = format!("INTERVAL_{}", kind.as_str().to_uppercase());
            let ms = r.ranged(&name, file.intervals.get(kind), default, floor, u64::MAX);
            Duration::from_millis(ms)
        };
        let intervals = Intervals {
            cpu: interval(MetricKind::Cpu),
            memory: interval(MetricKind::Memory),
            network: interval(MetricKind::Network),
            docker: interval(MetricKind::Docker),
            storage: interval(MetricKind::Storage),
            services: interval(MetricKind::Services),
            ports: interval(MetricKind::Ports),
            system: interval(MetricKind::System),
        };

        let history_max_points =
            r.ranged("HISTORY_MAX_POINTS", file.history_max_points, 300, 10, 10_000) as usize;
        let ws_max_payload =
            r.ranged("WS_MAX_PAYLOAD", file.ws_max_payload, 1024 * 1024, 1024, u32::MAX as u64) as usize;

        let max_connections =
            r.ranged("MAX_CONNECTIONS", file.max_connections, 100, 1, u32::MAX as u64) as usize;
        let max_connections_per_ip = r.ranged(
            "MAX_CONNECTIONS_PER_IP",
            file.max_connections_per_ip,
            10,
            1,
            u32::MAX as u64,
        ) as usize;
        if max_connections_per_ip > max_connections {
            r.reject("MAX_CONNECTIONS_PER_IP", "must not exceed MAX_CONNECTIONS".to_string());
        }

        let message_rate_limit =
            r.ranged("MESSAGE_RATE_LIMIT", file.message_rate_limit, 10, 1, u32::MAX as u64) as u32;
        let message_rate_window = Duration::from_millis(r.ranged(
            "MESSAGE_RATE_WINDOW",
            file.message_rate_window,
            1000,
            100,
            u64::MAX,
        ));
        let max_message_size =
            r.ranged("MAX_MESSAGE_SIZE", file.max_message_size, 1024, 16, u32::MAX as u64) as usize;

        let collector_timeout = match r.ranged("COLLECTOR_TIMEOUT", file.collector_timeout, 0, 0, u64::MAX) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let trust_proxy = match r.raw("TRUST_PROXY") {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                r.reject("TRUST_PROXY", format!("`{value}` is not a boolean"));
                false
            }),
            None => file.trust_proxy.unwrap_or(false),
        };

        let static_dir = r.path("STATIC_DIR", file.static_dir.clone(), "frontend-dist");
        let proc_path = r.path("PROC_PATH", file.proc_path.clone(), "/proc");
        let sys_path = r.path("SYS_PATH", file.sys_path.clone(), "/sys");

        let services = match r.raw("SERVICES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => file
                .services
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect()),
        };
        for name in services.iter().filter(|name| !is_valid_service_name(name)) {
            r.reject("SERVICES", format!("`{name}` is not a valid unit name"));
        }

        if !r.errors.is_empty() {
            return Err(ConfigError::Invalid(r.errors));
        }

        Ok(Self {
            host,
            port,
            log_level,
            intervals,
            history_max_points,
            ws_max_payload,
            max_connections,
            max_connections_per_ip,
            message_rate_limit,
            message_rate_window,
            max_message_size,
            collector_timeout,
            trust_proxy,
            static_dir,
            proc_path,
            sys_path,
            services,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Resolves each field env-first, then file, then default, collecting every rejection
struct Resolver<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    errors: Vec<FieldError>,
}

impl Resolver<'_> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{PREFIX}{name}")).filter(|v| !v.trim().is_empty())
    }

    fn reject(&mut self, name: &str, reason: String) {
        self.errors.push(FieldError {
            field: format!("{PREFIX}{name}"),
            reason,
        });
    }

    fn parsed<T: FromStr>(&mut self, name: &str, file: Option<T>, default: T) -> T {
        match self.raw(name) {
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                self.reject(name, format!("`{value}` could not be parsed"));
                default
            }),
            None => file.unwrap_or(default),
        }
    }

    fn ranged(&mut self, name: &str, file: Option<u64>, default: u64, min: u64, max: u64) -> u64 {
        let value = self.parsed(name, file, default);
        if value < min || value > max {
            let reason = if max == u64::MAX {
                format!("must be at least {min}, got {value}")
            } else {
                format!("must be between {min} and {max}, got {value}")
            };
            self.reject(name, reason);
            return default;
        }
        value
    }

    fn path(&self, name: &str, file: Option<PathBuf>, default: &str) -> PathBuf {
        self.raw(name)
            .map(PathBuf::from)
            .or(file)
            .unwrap_or_else(|| PathBuf::from(default))
    }
}
