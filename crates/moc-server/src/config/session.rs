//! Session cookie decoding configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_COOKIE_NAME: &str = "_oauth2_proxy";
pub const DEFAULT_DECODER_LIBRARY: &str = "/opt/decodess.so";

/// Which session decoder is resolved at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// `decode_state` from `decoder_library`, if it loads
    #[default]
    Native,
    /// In-process AES-CFB + LZ4 + MessagePack decoder
    Builtin,
    /// No session diagnostics
    Disabled,
}

impl DecoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderKind::Native => "native",
            DecoderKind::Builtin => "builtin",
            DecoderKind::Disabled => "disabled",
        }
    }
}

impl FromStr for DecoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(DecoderKind::Native),
            "builtin" => Ok(DecoderKind::Builtin),
            "disabled" => Ok(DecoderKind::Disabled),
            _ => Err(format!(
                "Unknown session decoder '{s}' (expected native, builtin or disabled)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Name of the session cookie whose value is handed to the decoder
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Shared secret passed to the decoder alongside the cookie value
    #[serde(default)]
    pub cookie_secret: String,
    #[serde(default)]
    pub decoder: DecoderKind,
    /// Shared library exporting `decode_state`; a missing library disables
    /// the session diagnostics
    #[serde(default = "default_decoder_library")]
    pub decoder_library: String,
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_decoder_library() -> String {
    DEFAULT_DECODER_LIBRARY.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            cookie_secret: String::new(),
            decoder: DecoderKind::default(),
            decoder_library: default_decoder_library(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.cookie_name, "_oauth2_proxy");
        assert!(session.cookie_secret.is_empty());
        assert_eq!(session.decoder_library, "/opt/decodess.so");
        assert_eq!(session.decoder, DecoderKind::Native);
    }

    #[test]
    fn test_decoder_kind_from_str() {
        assert_eq!("builtin".parse::<DecoderKind>().unwrap(), DecoderKind::Builtin);
        assert_eq!("NATIVE".parse::<DecoderKind>().unwrap(), DecoderKind::Native);
        assert_eq!(
            "disabled".parse::<DecoderKind>().unwrap().as_str(),
            "disabled"
        );
        assert!("aes".parse::<DecoderKind>().is_err());
    }

    #[test]
    fn test_partial_session_yaml() {
        let session: SessionConfig = serde_yaml::from_str("cookie_secret: '1234567890123456'").unwrap();
        assert_eq!(session.cookie_name, DEFAULT_COOKIE_NAME);
        assert_eq!(session.cookie_secret, "1234567890123456");
    }
}
