//! s3gw: an S3 protocol gateway over pluggable storage backends.
//!
//! # Usage
//!
//! ```text
//! ADMIN_ACCESS_KEY=root ADMIN_SECRET_KEY=rootsecret s3gw posix /srv/s3
//! s3gw --access root --secret rootsecret --port :9000 noop
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3GW_PORT` | `:7070` | Listen address (`--port`) |
//! | `ADMIN_ACCESS_KEY_ID` / `ADMIN_ACCESS_KEY` | *(required)* | Admin access key (`--access`) |
//! | `ADMIN_SECRET_ACCESS_KEY` / `ADMIN_SECRET_KEY` | *(required)* | Admin secret key (`--secret`) |
//! | `S3GW_REGION` | `us-east-1` | Region (`--region`) |
//! | `S3GW_ACCOUNTS` | *(empty)* | Extra accounts, `ak:sk,ak:sk` |
//! | `S3GW_CERT` / `S3GW_KEY` | *(unset)* | PEM cert and key (`--cert`, `--key`) |
//! | `S3GW_MAX_CLOCK_SKEW` | `900` | Accepted signature clock skew, seconds |
//! | `S3GW_DOMAIN` / `S3GW_VIRTUAL_HOSTING` | `localhost` / `false` | Virtual-hosted-style addressing |
//! | `S3GW_LOG_LEVEL` | `info` | Log filter |
//! | `S3GW_LOG_FORMAT` | `text` | `json` for JSON lines |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `S3GW_LOG_LEVEL`) |

mod tls;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use s3gw_auth::StaticCredentialProvider;
use s3gw_core::{Backend, GatewayConfig, NoopBackend, PosixBackend, S3Gateway};
use s3gw_http::service::{S3HttpConfig, S3HttpService};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line interface. Flags override the environment.
#[derive(Debug, Parser)]
#[command(name = "s3gw", version, about = "S3 protocol gateway")]
struct Cli {
    /// Listen address: `:port`, `ip:port`, or a bare port number.
    #[arg(short, long)]
    port: Option<String>,

    /// Admin access key.
    #[arg(long)]
    access: Option<String>,

    /// Admin secret key.
    #[arg(long)]
    secret: Option<String>,

    /// Region reported to clients and expected in signatures.
    #[arg(long)]
    region: Option<String>,

    /// PEM certificate chain; enables TLS together with `--key`.
    #[arg(long)]
    cert: Option<String>,

    /// PEM private key.
    #[arg(long)]
    key: Option<String>,

    #[command(subcommand)]
    backend: BackendCommand,
}

/// Storage backend selection.
#[derive(Debug, Subcommand)]
enum BackendCommand {
    /// Serve buckets from the directories under ROOT.
    Posix {
        /// Root directory; every subdirectory is a bucket.
        root: PathBuf,
    },
    /// Accept every request and store nothing.
    Noop,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = &self.port {
            config.listen = if port.parse::<u16>().is_ok() {
                format!(":{port}")
            } else {
                port.clone()
            };
        }
        if let Some(access) = &self.access {
            config.admin_access_key = Some(access.clone());
        }
        if let Some(secret) = &self.secret {
            config.admin_secret_key = Some(secret.clone());
        }
        if let Some(region) = &self.region {
            config.region.clone_from(region);
        }
        if let Some(cert) = &self.cert {
            config.cert_file = Some(cert.clone());
        }
        if let Some(key) = &self.key {
            config.key_file = Some(key.clone());
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(config: &GatewayConfig) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level filter: {}", config.log_level))?
    };

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
    Ok(())
}

/// The admin pair plus every configured account.
fn build_credential_provider(config: &GatewayConfig) -> Result<StaticCredentialProvider> {
    let (Some(access), Some(secret)) = (&config.admin_access_key, &config.admin_secret_key) else {
        anyhow::bail!("root user access and secret key must be provided");
    };
    let accounts = config
        .accounts
        .iter()
        .map(|a| (a.access_key.clone(), a.secret_key.clone()));
    Ok(StaticCredentialProvider::new(accounts).with_admin(access.clone(), secret.clone()))
}

fn build_http_config(
    config: &GatewayConfig,
    credentials: StaticCredentialProvider,
) -> S3HttpConfig {
    S3HttpConfig {
        domain: config.domain.clone(),
        virtual_hosting: config.virtual_hosting,
        region: config.region.clone(),
        max_clock_skew_secs: config.max_clock_skew_secs,
        credential_provider: Arc::new(credentials),
    }
}

async fn build_backend(command: &BackendCommand) -> Result<Arc<dyn Backend>> {
    match command {
        BackendCommand::Posix { root } => {
            let backend = PosixBackend::open(root.clone())
                .await
                .with_context(|| format!("cannot serve {}", root.display()))?;
            info!(root = %root.display(), "using posix backend");
            Ok(Arc::new(backend))
        }
        BackendCommand::Noop => {
            info!("using noop backend");
            Ok(Arc::new(NoopBackend))
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("received shutdown signal, draining connections");
}

/// Accept connections until shutdown, then wait for in-flight requests.
async fn serve(
    listener: TcpListener,
    service: S3HttpService<S3Gateway>,
    tls: Option<TlsAcceptor>,
) -> Result<()> {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let http = http.clone();
                let watcher = graceful.watcher();
                let tls = tls.clone();

                tokio::spawn(async move {
                    let result = match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => {
                                let conn = http.serve_connection(TokioIo::new(stream), svc);
                                watcher.watch(conn.into_owned()).await
                            }
                            Err(e) => {
                                debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                                return;
                            }
                        },
                        None => {
                            let conn = http.serve_connection(TokioIo::new(stream), svc);
                            watcher.watch(conn.into_owned()).await
                        }
                    };
                    if let Err(e) = result {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::from_env().context("invalid environment configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    init_tracing(&config)?;

    info!(
        listen = %config.listen,
        region = %config.region,
        accounts = config.accounts.len(),
        tls = config.tls_enabled(),
        virtual_hosting = config.virtual_hosting,
        version = VERSION,
        "starting s3gw",
    );

    let backend = build_backend(&cli.backend).await?;
    let gateway = S3Gateway::new(backend, config.region.clone());
    let credentials = build_credential_provider(&config)?;
    let service = S3HttpService::new(gateway, build_http_config(&config, credentials));

    let tls = match (&config.cert_file, &config.key_file) {
        (Some(cert), Some(key)) => Some(tls::acceptor(cert, key)?),
        _ => None,
    };

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(%addr, "listening for connections");

    serve(listener, service, tls).await
}
