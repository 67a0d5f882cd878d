//! MocServer struct and main run loop.
//!
//! The server owns everything requests share: the immutable config, the
//! pooled upstream client and the diagnostic renderer with its session
//! decoder. The accept loop spawns one task per connection.

use super::client::{create_http_client, HttpClient};
use super::handler::{handle_request, RequestHandlerContext};
use super::network::{create_listener, resolve_listen_addr};
use crate::config::Config;
use crate::diagnostics::{DiagnosticRenderer, SessionDecoder};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

const ACCEPT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// The mock server.
pub struct MocServer {
    config: Arc<Config>,
    http_client: HttpClient,
    renderer: DiagnosticRenderer,
}

impl MocServer {
    /// Create a server from a validated config and an optional session decoder.
    pub fn new(
        config: Config,
        decoder: Option<Arc<dyn SessionDecoder>>,
    ) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let http_client = create_http_client(&config.upstream)?;
        let renderer = DiagnosticRenderer::new(&config.session, decoder);

        Ok(Self {
            config: Arc::new(config),
            http_client,
            renderer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let authority = self.config.listen.authority();
        let addr = resolve_listen_addr(&authority)?;
        let listener = create_listener(addr)?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Accept errors never end the loop. Per-connection failures are retried
    /// immediately; anything else (such as running out of file descriptors)
    /// pauses accepting for a moment first.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Listening on http://{}", listener.local_addr()?);
        match self.config.default_upstream() {
            Some(url) => info!("Default upstream: {}", url),
            None => info!("No default upstream configured"),
        }
        if !self.renderer.has_session_decoder() {
            info!("Session state section disabled");
        }

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("Accept error: {}", err);
                    if let Some(pause) = accept_backoff(&err) {
                        tokio::time::sleep(pause).await;
                    }
                    continue;
                }
            };
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .serve_connection(TokioIo::new(stream), remote_addr)
                    .await
            });
        }
    }

    async fn serve_connection<I>(self: Arc<Self>, io: I, remote_addr: SocketAddr)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let service = service_fn(move |req| {
            let server = Arc::clone(&self);
            async move { server.handle_request_internal(req, remote_addr).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            error!("Error serving connection from {}: {}", remote_addr, err);
        }
    }

    async fn handle_request_internal<B>(
        &self,
        req: Request<B>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let ctx = RequestHandlerContext {
            http_client: &self.http_client,
            default_upstream: self.config.default_upstream(),
            renderer: &self.renderer,
        };
        handle_request(&ctx, req, remote_addr).await
    }
}

/// How long to pause before the next accept after `err`.
///
/// `None` for errors that only affect the one connection being accepted.
pub fn accept_backoff(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_ERROR_PAUSE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_new_rejects_empty_host() {
        let config = Config {
            listen: ListenConfig {
                host: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(MocServer::new(config, None).is_err());
    }

    #[tokio::test]
    async fn test_new_accepts_defaults() {
        let mut config = Config::default();
        config.upstream.tls_skip_verify = true;
        let server = MocServer::new(config, None).unwrap();
        assert_eq!(server.config().listen.port, 8000);
    }

    #[test]
    fn test_accept_backoff_connection_errors_retry_immediately() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(accept_backoff(&io::Error::from(kind)), None, "{kind:?}");
        }
    }

    #[test]
    fn test_accept_backoff_pauses_on_fd_exhaustion() {
        let emfile = io::Error::from_raw_os_error(libc::EMFILE);
        let enfile = io::Error::from_raw_os_error(libc::ENFILE);
        assert_eq!(accept_backoff(&emfile), Some(ACCEPT_ERROR_PAUSE));
        assert_eq!(accept_backoff(&enfile), Some(ACCEPT_ERROR_PAUSE));
    }

    #[tokio::test]
    async fn test_serve_survives_reset_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut config = Config::default();
        config.upstream.tls_skip_verify = true;
        let server = MocServer::new(config, None).unwrap();
        let handle = tokio::spawn(server.serve(listener));

        // A client that connects and immediately resets with SO_LINGER 0
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.set_linger(Some(Duration::ZERO)).unwrap();
        drop(socket.connect(addr).await.unwrap());

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /?s=201 HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 201 Created"), "{response}");
        assert!(!handle.is_finished());
        handle.abort();
    }
}
