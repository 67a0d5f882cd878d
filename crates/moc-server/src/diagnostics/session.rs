//! Session cookie decoding.
//!
//! The decoder is a pluggable capability resolved once at startup from
//! `session.decoder`:
//!
//! - `native` loads a shared library exporting
//!   `char *decode_state(const char *secret, const char *encoded);`
//!   and returns whatever text it produces
//! - `builtin` decodes in-process, see [`BuiltinSessionDecoder`]
//! - `disabled` never decodes
//!
//! When the native library cannot be loaded the session block is disabled
//! for the lifetime of the process.

use super::session_state::BuiltinSessionDecoder;
use crate::config::{DecoderKind, SessionConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("session decoder library '{path}' could not be loaded: {reason}")]
    Unavailable { path: String, reason: String },
    #[error("secret or cookie value contains an interior NUL byte")]
    InteriorNul,
    #[error("session decoder returned no result")]
    Empty,
    #[error("cookie is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cookie secret must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("cookie payload is {0} bytes, shorter than the cipher IV")]
    Truncated(usize),
    #[error("cookie payload is not an LZ4 frame: {0}")]
    Decompress(std::io::Error),
    #[error("cookie payload is not a session map: {0}")]
    Unpack(String),
}

/// Decrypts an opaque session cookie value with a shared secret.
pub trait SessionDecoder: Send + Sync {
    fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

/// Extract the value handed to the decoder from a `Cookie` header.
///
/// The header must start with `name=`. Everything from the first `|` on is
/// dropped, then every leading character that occurs anywhere in `name=` is
/// trimmed. That is a character-set trim rather than a prefix cut, so a value
/// starting with one of those characters loses it too:
/// `_oauth2_proxy=abc` yields `bc`.
pub fn session_cookie_value<'a>(cookie: &'a str, cookie_name: &str) -> Option<&'a str> {
    let prefix = format!("{cookie_name}=");
    if cookie.is_empty() || !cookie.starts_with(&prefix) {
        return None;
    }
    let head = cookie.split('|').next().unwrap_or_default();
    Some(head.trim_start_matches(|c: char| prefix.contains(c)))
}

/// Run the decoder over a `Cookie` header. Any failure yields `None`.
pub fn decode_session_cookie(
    decoder: &dyn SessionDecoder,
    cookie: &str,
    cookie_name: &str,
    secret: &[u8],
) -> Option<String> {
    let value = session_cookie_value(cookie, cookie_name)?;
    match decoder.decode(secret, value.as_bytes()) {
        Ok(decoded) if !decoded.is_empty() => Some(String::from_utf8_lossy(&decoded).into_owned()),
        Ok(_) => {
            debug!("Session cookie not decoded: {}", DecodeError::Empty);
            None
        }
        Err(e) => {
            debug!("Session cookie not decoded: {}", e);
            None
        }
    }
}

/// Resolve the configured decoder, logging and returning `None` when it is
/// disabled or unavailable.
pub fn load_session_decoder(session: &SessionConfig) -> Option<Arc<dyn SessionDecoder>> {
    match session.decoder {
        DecoderKind::Native => load_native_decoder(&session.decoder_library),
        DecoderKind::Builtin => {
            info!("Using builtin session decoder");
            Some(Arc::new(BuiltinSessionDecoder))
        }
        DecoderKind::Disabled => {
            info!("Session decoder disabled by configuration");
            None
        }
    }
}

fn load_native_decoder(path: &str) -> Option<Arc<dyn SessionDecoder>> {
    match NativeSessionDecoder::load(path) {
        Ok(decoder) => {
            info!("Session decoder loaded from {}", path);
            Some(Arc::new(decoder))
        }
        Err(e) => {
            warn!("Failed to load session decoder: {}", e);
            None
        }
    }
}

#[cfg(unix)]
pub use native::NativeSessionDecoder;

#[cfg(unix)]
mod native {
    use super::{DecodeError, SessionDecoder};
    use libc::{c_char, c_void};
    use std::ffi::{CStr, CString};

    type DecodeStateFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut c_char;

    const DECODE_SYMBOL: &[u8] = b"decode_state\0";

    /// `decode_state` resolved from a shared library via `dlopen`.
    pub struct NativeSessionDecoder {
        handle: *mut c_void,
        decode_state: DecodeStateFn,
    }

    // The handle is only used for `dlclose` on drop and the exported function
    // is reentrant.
    unsafe impl Send for NativeSessionDecoder {}
    unsafe impl Sync for NativeSessionDecoder {}

    impl NativeSessionDecoder {
        pub fn load(path: &str) -> Result<Self, DecodeError> {
            let unavailable = |reason: String| DecodeError::Unavailable {
                path: path.to_string(),
                reason,
            };
            let c_path = CString::new(path).map_err(|e| unavailable(e.to_string()))?;

            unsafe {
                let handle = libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL);
                if handle.is_null() {
                    return Err(unavailable(last_dl_error()));
                }

                let symbol = libc::dlsym(handle, DECODE_SYMBOL.as_ptr() as *const c_char);
                if symbol.is_null() {
                    let reason = last_dl_error();
                    libc::dlclose(handle);
                    return Err(unavailable(reason));
                }

                Ok(Self {
                    handle,
                    decode_state: std::mem::transmute::<*mut c_void, DecodeStateFn>(symbol),
                })
            }
        }
    }

    impl SessionDecoder for NativeSessionDecoder {
        fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
            let secret = CString::new(secret).map_err(|_| DecodeError::InteriorNul)?;
            let encoded = CString::new(ciphertext).map_err(|_| DecodeError::InteriorNul)?;

            unsafe {
                let result = (self.decode_state)(secret.as_ptr(), encoded.as_ptr());
                if result.is_null() {
                    return Err(DecodeError::Empty);
                }
                let decoded = CStr::from_ptr(result).to_bytes().to_vec();
                // The library allocates the result with malloc.
                libc::free(result as *mut c_void);
                Ok(decoded)
            }
        }
    }

    impl Drop for NativeSessionDecoder {
        fn drop(&mut self) {
            unsafe {
                libc::dlclose(self.handle);
            }
        }
    }

    fn last_dl_error() -> String {
        unsafe {
            let err = libc::dlerror();
            if err.is_null() {
                "unknown dynamic loader error".to_string()
            } else {
                CStr::from_ptr(err).to_string_lossy().into_owned()
            }
        }
    }
}

#[cfg(not(unix))]
pub struct NativeSessionDecoder;

#[cfg(not(unix))]
impl NativeSessionDecoder {
    pub fn load(path: &str) -> Result<Self, DecodeError> {
        Err(DecodeError::Unavailable {
            path: path.to_string(),
            reason: "dynamic loading is only supported on unix targets".to_string(),
        })
    }
}

#[cfg(not(unix))]
impl SessionDecoder for NativeSessionDecoder {
    fn decode(&self, _secret: &[u8], _ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Err(DecodeError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records its inputs and echoes `secret:ciphertext`.
    #[derive(Default)]
    struct EchoDecoder {
        calls: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    }

    impl SessionDecoder for EchoDecoder {
        fn decode(&self, secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
            self.calls
                .lock()
                .unwrap()
                .push((secret.to_vec(), ciphertext.to_vec()));
            let mut out = secret.to_vec();
            out.push(b':');
            out.extend_from_slice(ciphertext);
            Ok(out)
        }
    }

    struct FailingDecoder;

    impl SessionDecoder for FailingDecoder {
        fn decode(&self, _secret: &[u8], _ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
            Err(DecodeError::InteriorNul)
        }
    }

    struct EmptyDecoder;

    impl SessionDecoder for EmptyDecoder {
        fn decode(&self, _secret: &[u8], _ciphertext: &[u8]) -> Result<Vec<u8>, DecodeError> {
            Ok(Vec::new())
        }
    }

    const NAME: &str = "_oauth2_proxy";

    #[test]
    fn test_cookie_value_stops_at_pipe() {
        assert_eq!(
            session_cookie_value("_oauth2_proxy=KgfjpsgB|1700000000|sig", NAME),
            Some("KgfjpsgB")
        );
    }

    #[test]
    fn test_cookie_must_start_with_name() {
        assert_eq!(session_cookie_value("other=KgfjpsgB", NAME), None);
        assert_eq!(session_cookie_value("a=b; _oauth2_proxy=KgfjpsgB", NAME), None);
        assert_eq!(session_cookie_value("_oauth2_proxy", NAME), None);
        assert_eq!(session_cookie_value("", NAME), None);
    }

    #[test]
    fn test_cookie_prefix_is_trimmed_as_character_set() {
        // 'a', 'u', 't', 'h', 'o' all occur in "_oauth2_proxy=", so they are
        // trimmed along with the prefix.
        assert_eq!(session_cookie_value("_oauth2_proxy=abc|x", NAME), Some("bc"));
        assert_eq!(
            session_cookie_value("_oauth2_proxy=authToken", NAME),
            Some("Token")
        );
        assert_eq!(session_cookie_value("_oauth2_proxy=Kgf", NAME), Some("Kgf"));
    }

    #[test]
    fn test_cookie_value_can_be_trimmed_to_nothing() {
        assert_eq!(session_cookie_value("_oauth2_proxy=proxy|x", NAME), Some(""));
    }

    #[test]
    fn test_decode_passes_secret_and_value() {
        let decoder = EchoDecoder::default();
        let decoded =
            decode_session_cookie(&decoder, "_oauth2_proxy=Kgf|123", NAME, b"1234567890123456");
        assert_eq!(decoded.as_deref(), Some("1234567890123456:Kgf"));
        let calls = decoder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, b"Kgf".to_vec());
    }

    #[test]
    fn test_decode_skips_foreign_cookie() {
        let decoder = EchoDecoder::default();
        assert!(decode_session_cookie(&decoder, "session=Kgf", NAME, b"").is_none());
        assert!(decoder.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decoder_failure_yields_none() {
        assert!(decode_session_cookie(&FailingDecoder, "_oauth2_proxy=Kgf", NAME, b"").is_none());
        assert!(decode_session_cookie(&EmptyDecoder, "_oauth2_proxy=Kgf", NAME, b"").is_none());
    }

    #[test]
    fn test_load_missing_library() {
        let err = NativeSessionDecoder::load("/nonexistent/decodess.so")
            .err()
            .expect("loading should fail");
        assert!(matches!(err, DecodeError::Unavailable { .. }));

        let session = SessionConfig {
            decoder_library: "/nonexistent/decodess.so".to_string(),
            ..Default::default()
        };
        assert!(load_session_decoder(&session).is_none());
    }

    #[test]
    fn test_load_builtin_and_disabled() {
        let builtin = SessionConfig {
            decoder: DecoderKind::Builtin,
            decoder_library: "/nonexistent/decodess.so".to_string(),
            ..Default::default()
        };
        assert!(load_session_decoder(&builtin).is_some());

        let disabled = SessionConfig {
            decoder: DecoderKind::Disabled,
            ..Default::default()
        };
        assert!(load_session_decoder(&disabled).is_none());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_load_library_without_symbol() {
        let err = NativeSessionDecoder::load("libm.so.6")
            .err()
            .expect("libm does not export decode_state");
        assert!(matches!(err, DecodeError::Unavailable { .. }));
    }
}
