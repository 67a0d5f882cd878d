//! HTTP client for upstream pings.
//!
//! One pooled client is built at startup and shared by every request task.
//! Building it never fails for lack of trust roots: when the host has no
//! native CA bundle the bundled webpki roots are used instead, so at worst an
//! HTTPS ping fails at request time.

use http_body_util::Empty;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;

/// Type alias for the HTTP client used for upstream pings.
pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Create the shared HTTP client.
///
/// No connect or request timeout is configured; a ping waits as long as the
/// transport lets it.
pub fn create_http_client(upstream: &UpstreamConfig) -> Result<HttpClient, anyhow::Error> {
    let tls_config = upstream_tls_config(upstream.tls_skip_verify)?;

    let mut http_connector = HttpConnector::new();
    http_connector.enforce_http(false);

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Ok(Client::builder(TokioExecutor::new()).build(https_connector))
}

fn upstream_tls_config(skip_verify: bool) -> Result<ClientConfig, anyhow::Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| anyhow::anyhow!("Failed to select TLS protocol versions: {e}"))?;

    let config = if skip_verify {
        warn!("TLS certificate verification DISABLED for upstream pings (development/testing only)");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(&provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(native_root_store())
            .with_no_client_auth()
    };
    Ok(config)
}

fn native_root_store() -> RootCertStore {
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        debug!("Skipping native root certificate: {}", err);
    }
    root_store_with_fallback(native.certs)
}

/// Trust `native` certificates, or the bundled webpki roots when none of
/// them parse.
pub fn root_store_with_fallback(native: Vec<CertificateDer<'static>>) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native);
    if ignored > 0 {
        debug!("Ignored {} unparsable native root certificates", ignored);
    }
    if added == 0 {
        warn!("No native root CA certificates found, falling back to bundled webpki roots");
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    roots
}

/// Accepts any server certificate chain but still checks that the peer holds
/// the key it presented.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl AcceptAnyServerCert {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_client_skip_verify() {
        let upstream = UpstreamConfig {
            url: None,
            tls_skip_verify: true,
        };
        assert!(create_http_client(&upstream).is_ok());
    }

    #[tokio::test]
    async fn test_create_client_verifying() {
        assert!(create_http_client(&UpstreamConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_native_roots_fall_back_to_webpki() {
        let roots = root_store_with_fallback(Vec::new());
        assert_eq!(roots.len(), webpki_roots::TLS_SERVER_ROOTS.len());
        assert!(!roots.is_empty());
    }

    #[test]
    fn test_unparsable_native_roots_fall_back_to_webpki() {
        let garbage = CertificateDer::from(b"not a certificate".to_vec());
        let roots = root_store_with_fallback(vec![garbage]);
        assert_eq!(roots.len(), webpki_roots::TLS_SERVER_ROOTS.len());
    }

    #[test]
    fn test_accept_any_server_cert_schemes() {
        let verifier = AcceptAnyServerCert::new(&rustls::crypto::ring::default_provider());
        let schemes = verifier.supported_verify_schemes();
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
        assert!(schemes.contains(&SignatureScheme::ED25519));
    }

    #[test]
    fn test_accept_any_server_cert_skips_chain_validation() {
        let verifier = AcceptAnyServerCert::new(&rustls::crypto::ring::default_provider());
        let cert = CertificateDer::from(b"self-signed".to_vec());
        let name = ServerName::try_from("upstream.local").unwrap();
        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
    }
}
