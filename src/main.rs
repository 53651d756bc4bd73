//! `wirelens` binary: CLI parsing, logging bootstrap, component wiring.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wirelens::api::AppContext;
use wirelens::capture::{CaptureAgent, TcpFingerprintStore};
use wirelens::config::RuntimeConfig;
use wirelens::database::FingerprintDatabase;
use wirelens::store::FingerprintStore;
use wirelens::{listener, store};

/// Passive multi-layer network fingerprinting server (TLS / HTTP/2 / TCP)
#[derive(Parser, Debug)]
#[command(name = "wirelens")]
#[command(version, about, long_about = None)]
struct Args {
    /// Listen port
    #[arg(long, default_value_t = 8443, env = "WIRELENS_PORT")]
    port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0", env = "WIRELENS_HOST")]
    host: String,

    /// TLS certificate path (PEM)
    #[arg(long, default_value = "server.crt")]
    cert: String,

    /// TLS private key path (PEM)
    #[arg(long, default_value = "server.key")]
    key: String,

    /// Capture interface name (e.g. eth0); empty auto-detects all usable
    /// interfaces plus loopback
    #[arg(long, default_value = "")]
    iface: String,

    /// Disable the TCP SYN capture agent
    #[arg(long)]
    disable_tcp: bool,

    /// Fingerprint store capacity before wholesale clearing
    #[arg(long, default_value_t = store::DEFAULT_STORE_CAP)]
    store_cap: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "WIRELENS_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install the rustls CryptoProvider before any TLS operations.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("starting wirelens v{}", env!("CARGO_PKG_VERSION"));

    let config = RuntimeConfig {
        port: args.port,
        host: args.host,
        cert_path: args.cert,
        key_path: args.key,
        iface: if args.iface.is_empty() {
            None
        } else {
            Some(args.iface)
        },
        disable_tcp: args.disable_tcp,
        store_cap: args.store_cap,
    };
    config.validate()?;

    info!("loading fingerprint databases");
    let database = Arc::new(FingerprintDatabase::load());
    if !database.has_ja3() && !database.has_ja4() && !database.has_http2() {
        warn!("no fingerprint catalogs loaded; analyzer runs with empty lookups");
    }

    let fingerprint_store = FingerprintStore::new();
    let tcp_store = TcpFingerprintStore::new();

    // Capture failures must not abort startup: without privileges the agent
    // degrades to a stub and the analyzer tolerates the missing TCP layer.
    let capture = if config.disable_tcp {
        info!("TCP capture agent disabled via --disable-tcp");
        CaptureAgent::disabled(tcp_store.clone())
    } else {
        CaptureAgent::start(config.iface.as_deref(), config.port, tcp_store.clone())
    };
    if !capture.is_active() && !config.disable_tcp {
        warn!("running without TCP fingerprints; rerun with elevated privileges to enable them");
    }

    // Periodic cap enforcement for both stores.
    {
        let fingerprint_store = fingerprint_store.clone();
        let tcp_store = tcp_store.clone();
        let cap = config.store_cap;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                fingerprint_store.enforce_cap(cap);
                tcp_store.enforce_cap(cap);
            }
        });
    }

    let ctx = AppContext {
        store: fingerprint_store,
        database,
    };

    tokio::select! {
        result = listener::run(&config, ctx, tcp_store) => result,
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wirelens={level},info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    Ok(())
}
