mod config;
mod error;
mod handlers;
mod logging;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use common::{AutoDetector, CandidateTable, FetchConfig, HttpFetcher};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // LOG_DIR se lee antes que el resto para no perder los warnings de config
    let log_dir = ServerConfig::log_dir_from_env();
    let _log_guard = logging::init(log_dir.as_deref())?;

    let config = ServerConfig::from_env();
    info!("configuración: {:?}", config);

    let fetcher = HttpFetcher::new(FetchConfig {
        timeout: config.fetch_timeout,
        ..FetchConfig::default()
    })
    .context("no se pudo crear el cliente HTTP")?;

    let table = match &config.autodetect_table {
        Some(path) => CandidateTable::from_json_file(path)
            .with_context(|| format!("tabla de auto-detect inválida: {}", path.display()))?,
        None => CandidateTable::default(),
    };

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, Arc::new(fetcher), AutoDetector::new(table));

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", bind_addr))?;
    info!("server escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("no se pudo escuchar ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("ctrl-c recibido, cerrando");
}
