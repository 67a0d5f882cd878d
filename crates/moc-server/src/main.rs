use clap::Parser;
use moc_server::config::{Config, ConfigOverrides, DecoderKind};
use moc_server::diagnostics::load_session_decoder;
use moc_server::server::MocServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moc-server")]
#[command(about = "Configurable HTTP mock endpoint for latency and error testing")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen host
    #[arg(long, env = "MOC_SERVER_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "MOC_SERVER_PORT")]
    port: Option<u16>,

    /// Default upstream pinged on every request without `u`
    #[arg(long, env = "MOC_SERVER_UPSTREAM")]
    upstream: Option<String>,

    /// Session cookie name
    #[arg(long, env = "MOC_OAUTH2PROXY_COOKIE_NAME")]
    cookie_name: Option<String>,

    /// Secret handed to the session decoder
    #[arg(long, env = "MOC_OAUTH2PROXY_COOKIE_SECRET", hide_env_values = true)]
    cookie_secret: Option<String>,

    /// Session decoder: native, builtin or disabled
    #[arg(long = "session-decoder", env = "MOC_SESSION_DECODER")]
    decoder: Option<DecoderKind>,

    /// Shared library exporting `decode_state`
    #[arg(long, env = "MOC_SESSION_DECODER_LIBRARY")]
    decoder_library: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            upstream: self.upstream.clone(),
            cookie_name: self.cookie_name.clone(),
            cookie_secret: self.cookie_secret.clone(),
            decoder: self.decoder,
            decoder_library: self.decoder_library.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path);
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    config.apply_overrides(args.overrides());
    config.validate()?;

    let decoder = load_session_decoder(&config.session);
    let server = MocServer::new(config, decoder)?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }
}
