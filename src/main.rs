//! newswatch: binary entrypoint.
//! Wires storage, config, transport and the monitor, then serves the local
//! HTTP API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newswatch::config::{load_config_default, ConfigStore};
use newswatch::storage::{FileStorage, Storage};
use newswatch::telemetry::Metrics;
use newswatch::transport::{RelayTransport, Transport};
use newswatch::{api, Monitor};

const ENV_STATE_DIR: &str = "NEWSWATCH_STATE_DIR";
const ENV_BIND: &str = "NEWSWATCH_BIND";
const ENV_LOG_JSON: &str = "NEWSWATCH_LOG_JSON";
const DEFAULT_STATE_DIR: &str = "state";
const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Compact logs by default; `NEWSWATCH_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newswatch=info,warn"));

    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init()?;

    let state_dir = std::env::var(ENV_STATE_DIR).unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string());
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&state_dir));

    let seed = load_config_default().context("loading seed config")?;
    let config = Arc::new(ConfigStore::open(storage.clone(), seed).await);

    let transport: Arc<dyn Transport> =
        Arc::new(RelayTransport::from_env().context("building relay transport")?);

    let monitor = Monitor::open(transport, storage, config).await;
    let app = api::app(monitor.clone(), &metrics);

    let bind = std::env::var(ENV_BIND).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("{ENV_BIND}={bind} is not a socket address"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, state_dir = %state_dir, "newswatch listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("http server")?;

    monitor.shutdown();
    tracing::info!("newswatch stopped");
    Ok(())
}
