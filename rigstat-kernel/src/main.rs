/**
 * RIGSTAT KERNEL - Point d'entrée du serveur de télémétrie
 *
 * RÔLE : Bootstrap config + registre des reporters + API HTTP + dashboard.
 * Les rigs postent leurs stats, le dashboard lit /api/stats.
 *
 * ARCHITECTURE : un seul ReporterRegistry construit ici et passé aux handlers
 * via l'état Axum ; pas d'état global.
 */

mod config;
mod dashboard;
mod error;
mod health;
mod http;
mod models;
mod registry;

use crate::config::{load_config, KernelConfig};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::registry::ReporterRegistry;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rigstat_kernel=info")),
        )
        .init();

    let cfg: KernelConfig = load_config().await;
    info!(
        "[kernel] registry: max {} reporters, stale after {}s",
        cfg.registry.max_entries, cfg.registry.stale_threshold_secs
    );

    let registry = ReporterRegistry::from_config(&cfg.registry);
    if let Some(secs) = cfg.registry.sweep_interval_secs {
        registry.spawn_stale_sweeper(secs);
    }

    let app_state = AppState {
        registry,
        health_tracker: HealthTracker::new(),
    };
    let app = http::build_router(app_state);

    let addr = cfg.http.bind;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("[kernel] shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[kernel] failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
