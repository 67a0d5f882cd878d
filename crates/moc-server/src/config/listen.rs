//! Listener configuration.

use serde::{Deserialize, Serialize};

/// Plain HTTP/1.1 listener address
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8000
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ListenConfig {
    /// `host:port` string suitable for socket address resolution.
    /// IPv6 literals are bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_defaults() {
        let listen = ListenConfig::default();
        assert_eq!(listen.host, "0.0.0.0");
        assert_eq!(listen.port, 8000);
    }

    #[test]
    fn test_partial_listen_yaml() {
        let listen: ListenConfig = serde_yaml::from_str("port: 9100").unwrap();
        assert_eq!(listen.host, "0.0.0.0");
        assert_eq!(listen.authority(), "0.0.0.0:9100");
    }

    #[test]
    fn test_authority_brackets_ipv6() {
        let listen = ListenConfig {
            host: "::1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(listen.authority(), "[::1]:9000");

        let listen = ListenConfig {
            host: "localhost".to_string(),
            ..Default::default()
        };
        assert_eq!(listen.authority(), "localhost:8000");
    }
}
