//! Configuration types for the mock server.
//!
//! A [`Config`] is assembled once at startup (YAML file, then CLI/env
//! overrides) and shared read-only with every connection task afterwards.

mod listen;
mod session;
mod upstream;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use listen::ListenConfig;
pub use session::{DecoderKind, SessionConfig, DEFAULT_COOKIE_NAME, DEFAULT_DECODER_LIBRARY};
pub use upstream::UpstreamConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Listen host must not be empty")]
    EmptyHost,
    #[error("Session cookie name must not be empty")]
    EmptyCookieName,
    #[error("{0}")]
    Upstream(String),
}

/// Values supplied on the command line or through the environment. Each
/// `Some` replaces the corresponding file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub upstream: Option<String>,
    pub cookie_name: Option<String>,
    pub cookie_secret: Option<String>,
    pub decoder: Option<DecoderKind>,
    pub decoder_library: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::EmptyCookieName);
        }

        self.upstream.validate().map_err(ConfigError::Upstream)?;

        Ok(())
    }

    pub fn default_upstream(&self) -> Option<&str> {
        self.upstream.url.as_deref()
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(host) = overrides.host {
            self.listen.host = host;
        }
        if let Some(port) = overrides.port {
            self.listen.port = port;
        }
        if let Some(url) = overrides.upstream {
            self.upstream.url = Some(url);
        }
        if let Some(name) = overrides.cookie_name {
            self.session.cookie_name = name;
        }
        if let Some(secret) = overrides.cookie_secret {
            self.session.cookie_secret = secret;
        }
        if let Some(kind) = overrides.decoder {
            self.session.decoder = kind;
        }
        if let Some(path) = overrides.decoder_library {
            self.session.decoder_library = path;
        }
    }
}
