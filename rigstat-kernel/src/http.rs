/**
 * API HTTP RIGSTAT - Serveur Axum du kernel
 *
 * RÔLE :
 * Point d'entrée des rigs (ingestion) et du dashboard (lecture).
 *
 * ROUTES :
 * - POST /             : stats d'un rig {wallet, cpu_usage, uptime, timestamp}
 * - GET  /api/stats    : snapshot des reporters actifs, ordre d'arrivée
 * - GET  /dashboard    : page HTML statique
 * - GET  /health       : liveness
 * - GET  /system/health: compteurs kernel
 *
 * ERREURS :
 * - 400 + {"status":"error","message":...} si payload invalide
 * - 500 + "Internal server error" sinon (détail dans les logs)
 */

use crate::dashboard::dashboard_page;
use crate::error::KernelError;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::StatsIn;
use crate::registry::{epoch_now, ReporterRegistry};
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: ReporterRegistry,
    pub health_tracker: HealthTracker,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", post(receive_stats))
        .route("/api/stats", get(get_all_stats))
        .route("/dashboard", get(dashboard_page))
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .with_state(app_state)
}

// POST / (ingestion). Le corps est lu brut pour maîtriser les réponses 400.
async fn receive_stats(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), KernelError> {
    let report = match StatsIn::from_body(&body).and_then(StatsIn::validate) {
        Ok(report) => report,
        Err(e) => {
            app.health_tracker.record_rejected();
            warn!(reason = %e, field = ?e.field(), "rejected stats report");
            return Err(e.into());
        }
    };

    debug!(
        wallet = %report.identifier,
        cpu = report.cpu_usage,
        uptime = report.uptime,
        "received stats"
    );
    app.registry.ingest(report);
    app.health_tracker.record_accepted();

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "status": "success", "message": "Data received" })),
    ))
}

// GET /api/stats — sérialisé à la main pour garder l'ordre d'insertion
async fn get_all_stats(State(app): State<AppState>) -> Result<Response, KernelError> {
    let snapshot = app.registry.snapshot(epoch_now());
    let body = serde_json::to_vec(&snapshot).context("serializing stats snapshot")?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.registry))
}
