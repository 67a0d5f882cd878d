//! Compact JWT claim decoding.
//!
//! Only the header and payload segments are decoded. The signature is never
//! looked at, so the claims are informational and must not be trusted.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde_json::{Map, Value};

/// URL-safe alphabet that accepts non-zero trailing bits and optional padding.
pub(crate) const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("token has fewer than two segments")]
    MissingSegments,
    #[error("segment is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("segment is not a JSON object")]
    NotAnObject,
}

/// Decoded header and payload of a compact JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl TokenClaims {
    pub fn decode(token: &str) -> Result<Self, ClaimsError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload)) = (segments.next(), segments.next()) else {
            return Err(ClaimsError::MissingSegments);
        };
        Ok(Self {
            header: decode_segment(header)?,
            payload: decode_segment(payload)?,
        })
    }

    /// Header rendered as 2-space indented JSON
    pub fn header_pretty(&self) -> String {
        to_pretty(&self.header)
    }

    /// Payload rendered as 2-space indented JSON
    pub fn payload_pretty(&self) -> String {
        to_pretty(&self.payload)
    }
}

fn decode_segment(segment: &str) -> Result<Map<String, Value>, ClaimsError> {
    let bytes = LENIENT_URL_SAFE.decode(pad_segment(segment))?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(ClaimsError::NotAnObject),
    }
}

/// Pad with `=` up to a multiple of 4.
pub fn pad_segment(segment: &str) -> String {
    let mut padded = segment.to_string();
    let remainder = padded.len() % 4;
    if remainder != 0 {
        padded.push_str(&"=".repeat(4 - remainder));
    }
    padded
}

fn to_pretty(map: &Map<String, Value>) -> String {
    // A map of JSON values always serializes.
    serde_json::to_string_pretty(map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_unsigned_token() {
        let claims = TokenClaims::decode("eyJhbGciOiJub25lIn0.eyJzdWIiOiJhIn0.sig").unwrap();
        assert_eq!(Value::Object(claims.header.clone()), json!({"alg": "none"}));
        assert_eq!(Value::Object(claims.payload.clone()), json!({"sub": "a"}));
        assert_eq!(claims.header_pretty(), "{\n  \"alg\": \"none\"\n}");
        assert_eq!(claims.payload_pretty(), "{\n  \"sub\": \"a\"\n}");
    }

    #[test]
    fn test_signature_is_optional() {
        assert!(TokenClaims::decode("eyJhbGciOiJub25lIn0.eyJzdWIiOiJhIn0").is_ok());
    }

    #[test]
    fn test_single_segment_rejected() {
        assert!(matches!(
            TokenClaims::decode("eyJhbGciOiJub25lIn0"),
            Err(ClaimsError::MissingSegments)
        ));
    }

    #[test]
    fn test_url_safe_alphabet() {
        // payload {"q":"???"} encodes with '_' in the URL-safe alphabet
        let claims = TokenClaims::decode("eyJhbGciOiJub25lIn0.eyJxIjoiPz8_In0.").unwrap();
        assert_eq!(claims.payload["q"], "???");
    }

    #[test]
    fn test_non_canonical_trailing_bits_accepted() {
        // "eyJhIjoxfR" is {"a":1} with a non-zero bit after the last byte;
        // the canonical form ends in 'Q'
        let claims = TokenClaims::decode("eyJhbGciOiJub25lIn0.eyJhIjoxfR.sig").unwrap();
        assert_eq!(Value::Object(claims.payload), json!({"a": 1}));
    }

    #[test]
    fn test_key_order_preserved() {
        // header {"typ":"JWT","alg":"HS256"}
        let claims = TokenClaims::decode("eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhIn0.x")
            .unwrap();
        let keys: Vec<_> = claims.header.keys().cloned().collect();
        assert_eq!(keys, vec!["typ", "alg"]);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(matches!(
            TokenClaims::decode("not*base64.eyJzdWIiOiJhIn0.sig"),
            Err(ClaimsError::Base64(_))
        ));
    }

    #[test]
    fn test_invalid_json_rejected() {
        // "bm90LWpzb24" is base64url for "not-json"
        assert!(matches!(
            TokenClaims::decode("bm90LWpzb24.eyJzdWIiOiJhIn0.sig"),
            Err(ClaimsError::Json(_))
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        // "WzEsMl0" is base64url for [1,2]
        assert!(matches!(
            TokenClaims::decode("WzEsMl0.eyJzdWIiOiJhIn0.sig"),
            Err(ClaimsError::NotAnObject)
        ));
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(TokenClaims::decode(".").is_err());
        assert!(TokenClaims::decode("..").is_err());
    }

    #[test]
    fn test_pad_segment() {
        assert_eq!(pad_segment("abcd"), "abcd");
        assert_eq!(pad_segment("abc"), "abc=");
        assert_eq!(pad_segment("ab"), "ab==");
        assert_eq!(pad_segment(""), "");
    }
}
