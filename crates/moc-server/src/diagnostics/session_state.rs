//! Pure-Rust session cookie decoder.
//!
//! A cookie value is base64url text wrapping
//! `IV (16 bytes) || AES-CFB(LZ4 frame(msgpack session map))`, keyed by the
//! cookie secret. The AES variant follows the secret length (16, 24 or 32
//! bytes). The decoded session is rendered on one line as
//!
//! ```text
//! &{CreatedAt:2022-04-06 14:54:01.9185632 +0000 UTC ExpiresOn:<nil> AccessToken:... Groups:[a b] PreferredUsername:alice}
//! ```
//!
//! which is the text the shared-library decoder produces for the same cookie.

use super::jwt::LENIENT_URL_SAFE;
use super::session::{DecodeError, SessionDecoder};
use aes::{Aes128, Aes192, Aes256};
use base64::Engine;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::Decryptor;
use chrono::{DateTime, Utc};
use lz4_flex::frame::FrameDecoder;
use rmpv::Value;
use std::fmt;
use std::io::Read;

const IV_LEN: usize = 16;

/// msgpack extension type for timestamps
const TIMESTAMP_EXT: i8 = -1;

/// Decodes session cookies in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSessionDecoder;

impl SessionDecoder for BuiltinSessionDecoder {
    fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let sealed = LENIENT_URL_SAFE.decode(ciphertext)?;
        let compressed = cfb_decrypt(secret, &sealed)?;

        let mut packed = Vec::new();
        FrameDecoder::new(compressed.as_slice())
            .read_to_end(&mut packed)
            .map_err(DecodeError::Decompress)?;

        let state = SessionState::from_msgpack(&packed)?;
        Ok(state.to_string().into_bytes())
    }
}

fn cfb_decrypt(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if sealed.len() < IV_LEN {
        return Err(DecodeError::Truncated(sealed.len()));
    }
    let (iv, body) = sealed.split_at(IV_LEN);
    let mut plain = body.to_vec();
    let key_length = |_| DecodeError::KeyLength(key.len());
    match key.len() {
        16 => Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(key_length)?
            .decrypt(&mut plain),
        24 => Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(key_length)?
            .decrypt(&mut plain),
        32 => Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(key_length)?
            .decrypt(&mut plain),
        n => return Err(DecodeError::KeyLength(n)),
    }
    Ok(plain)
}

/// Authenticated user session carried in the cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub created_at: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub nonce: Vec<u8>,
    pub email: String,
    pub user: String,
    pub groups: Vec<String>,
    pub preferred_username: String,
}

impl SessionState {
    /// Parse a msgpack map keyed by the short field names (`ca`, `eo`, `at`,
    /// `it`, `rt`, `n`, `e`, `u`, `g`, `pu`). Unknown keys and nil values are
    /// skipped.
    pub fn from_msgpack(packed: &[u8]) -> Result<Self, DecodeError> {
        let value = rmpv::decode::read_value(&mut &packed[..])
            .map_err(|e| DecodeError::Unpack(e.to_string()))?;
        let Value::Map(entries) = value else {
            return Err(DecodeError::Unpack("session is not a map".to_string()));
        };

        let mut state = Self::default();
        for (key, value) in entries {
            let Some(key) = key.as_str() else {
                continue;
            };
            if value.is_nil() {
                continue;
            }
            match key {
                "ca" => state.created_at = Some(timestamp(key, value)?),
                "eo" => state.expires_on = Some(timestamp(key, value)?),
                "at" => state.access_token = text(key, value)?,
                "it" => state.id_token = text(key, value)?,
                "rt" => state.refresh_token = text(key, value)?,
                "n" => state.nonce = binary(key, value)?,
                "e" => state.email = text(key, value)?,
                "u" => state.user = text(key, value)?,
                "g" => state.groups = text_list(key, value)?,
                "pu" => state.preferred_username = text(key, value)?,
                _ => {}
            }
        }
        Ok(state)
    }
}

fn unexpected(key: &str, value: &Value) -> DecodeError {
    DecodeError::Unpack(format!("field '{key}' has unexpected value {value}"))
}

fn text(key: &str, value: Value) -> Result<String, DecodeError> {
    match value {
        Value::String(s) => Ok(match s.into_str() {
            Some(s) => s,
            None => return Err(DecodeError::Unpack(format!("field '{key}' is not UTF-8"))),
        }),
        Value::Binary(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        other => Err(unexpected(key, &other)),
    }
}

fn binary(key: &str, value: Value) -> Result<Vec<u8>, DecodeError> {
    match value {
        Value::Binary(bytes) => Ok(bytes),
        Value::String(s) => Ok(s.into_bytes()),
        other => Err(unexpected(key, &other)),
    }
}

fn text_list(key: &str, value: Value) -> Result<Vec<String>, DecodeError> {
    match value {
        Value::Array(items) => items.into_iter().map(|item| text(key, item)).collect(),
        other => Err(unexpected(key, &other)),
    }
}

fn timestamp(key: &str, value: Value) -> Result<DateTime<Utc>, DecodeError> {
    let Value::Ext(TIMESTAMP_EXT, data) = &value else {
        return Err(unexpected(key, &value));
    };
    let (secs, nanos) = match data.len() {
        4 => (i64::from(be_u32(&data[..4])), 0),
        8 => {
            let packed = u64::from_be_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]);
            ((packed & 0x3_ffff_ffff) as i64, (packed >> 34) as u32)
        }
        12 => {
            let secs = i64::from_be_bytes([
                data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
            ]);
            (secs, be_u32(&data[..4]))
        }
        _ => return Err(unexpected(key, &value)),
    };
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| unexpected(key, &value))
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// `2006-01-02 15:04:05.999999999 +0000 UTC`, trailing fraction zeros
/// dropped, or `<nil>` when unset.
struct SessionTime<'a>(Option<&'a DateTime<Utc>>);

impl fmt::Display for SessionTime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(time) = self.0 else {
            return f.write_str("<nil>");
        };
        write!(f, "{}", time.format("%Y-%m-%d %H:%M:%S"))?;
        let nanos = time.timestamp_subsec_nanos() % 1_000_000_000;
        if nanos > 0 {
            let fraction = format!("{nanos:09}");
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        f.write_str(" +0000 UTC")
    }
}

/// Space-separated items in brackets: `[1 2 3]`
struct Bracketed<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Display for Bracketed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "&{{CreatedAt:{} ExpiresOn:{} AccessToken:{} IDToken:{} RefreshToken:{} \
             Nonce:{} Email:{} User:{} Groups:{} PreferredUsername:{}}}",
            SessionTime(self.created_at.as_ref()),
            SessionTime(self.expires_on.as_ref()),
            self.access_token,
            self.id_token,
            self.refresh_token,
            Bracketed(&self.nonce),
            self.email,
            self.user,
            Bracketed(&self.groups),
            self.preferred_username,
        )
    }
}
