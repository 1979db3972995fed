//! Caching reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────────┐
//!                     │                  CACHING PROXY                    │
//!   Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ──────────────────┼─▶│   http   │──▶│  cache   │──▶│    proxy     │───┼──▶ Origin
//!                     │  │  server  │   │middleware│   │  forwarding  │   │
//!   Client Response   │  │ dispatch │◀──│ + store  │◀──│   + relay    │◀──┼─── Server
//!   ◀─────────────────┼──│          │   └──────────┘   └──────────────┘   │
//!                     │  └──────────┘                                     │
//!                     │  ┌─────────────────────────────────────────────┐  │
//!                     │  │  config · observability · lifecycle · net   │  │
//!                     │  └─────────────────────────────────────────────┘  │
//!                     └───────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use caching_proxy::config::{read_config, validate_config, ConfigError, ProxyConfig, TlsConfig};
use caching_proxy::http::HttpServer;
use caching_proxy::lifecycle::{signals, Shutdown};
use caching_proxy::net::tls::load_tls_config;
use caching_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "caching-proxy", version)]
#[command(about = "HTTP reverse proxy with an optional RFC 7234 response cache", long_about = None)]
struct Cli {
    /// TOML configuration file; flags override its values
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Address to listen on (e.g. ":80" or "127.0.0.1:8080")
    #[arg(short, long = "bind-addr")]
    bind_addr: Option<String>,

    /// Origin server requests are forwarded to
    #[arg(short, long = "target-server")]
    target_server: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Put the response cache in front of the origin
    #[arg(short = 'c', long = "enable-cache")]
    enable_cache: bool,

    /// TLS certificate (PEM) for the listener
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key (PEM) for the listener
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Skip certificate verification towards an HTTPS origin
    #[arg(long)]
    insecure: bool,
}

impl Cli {
    /// Read the config file (if any) and apply flag overrides on top.
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ProxyConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(addr) = &self.bind_addr {
            config.listener.bind_address = normalize_bind_address(addr);
        }
        if let Some(target) = &self.target_server {
            config.upstream.target = Some(target.clone());
            config.upstream.routes.clear();
        }
        if self.debug {
            config.observability.log_level = "debug".to_string();
        }
        if self.enable_cache {
            config.cache.enabled = true;
        }
        if let (Some(cert), Some(key)) = (&self.tls_cert, &self.tls_key) {
            config.listener.tls = Some(TlsConfig {
                cert_path: cert.display().to_string(),
                key_path: key.display().to_string(),
            });
        }
        if self.insecure {
            config.upstream.insecure_tls = true;
        }
    }
}

/// Accept the host-less `:port` form for all interfaces.
fn normalize_bind_address(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("caching-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = ?config.upstream.target,
        routes = config.upstream.routes.len(),
        cache_enabled = config.cache.enabled,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics endpoint");
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    let addr: SocketAddr = config.listener.bind_address.parse()?;
    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(addr, rustls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
