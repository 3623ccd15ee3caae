use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A socket in the listening state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningPort {
    pub port: u16,
    pub protocol: Protocol,
    pub service: String,
    pub process: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Well-known name for common ports, `Port N` otherwise
pub fn service_name(port: u16) -> String {
    let name = match port {
        22 => "SSH",
        80 => "HTTP",
        443 => "HTTPS",
        3000 => "Dev Server",
        3001 => "API Server",
        3306 => "MySQL",
        5432 => "PostgreSQL",
        6379 => "Redis",
        8080 => "HTTP Alt",
        8443 => "HTTPS Alt",
        27017 => "MongoDB",
        _ => return format!("Port {}", port),
    };
    name.to_string()
}
