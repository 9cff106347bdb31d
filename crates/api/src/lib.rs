//! Proctoring Audit API Server
//!
//! Read-side REST surface over persisted integrity records: live health,
//! per-attempt violation rows, and final integrity summaries for the
//! mentor/admin dashboard.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod rate_limit;
mod routes;

use integrity_ledger::InMemoryViolationStore;

/// Application state shared across handlers
pub struct AppState {
    /// Violation store the sessions persist into
    pub store: Arc<InMemoryViolationStore>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state around a shared store
    pub fn new(store: Arc<InMemoryViolationStore>) -> Self {
        Self {
            store,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: SystemMetrics,
}

/// Store-level metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub violation_rows: usize,
    pub persisted_attempts: usize,
}

/// Create the application router
pub fn create_router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route(
            "/api/v1/attempts/:id/violations",
            get(routes::attempts::get_violations),
        )
        .route(
            "/api/v1/attempts/:id/integrity",
            get(routes::attempts::get_integrity),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        metrics: SystemMetrics {
            violation_rows: state.store.row_count(),
            persisted_attempts: state.store.attempt_count(),
        },
    };

    Json(response)
}

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Run the server
pub async fn run_server(addr: &str) -> anyhow::Result<()> {
    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let store = Arc::new(InMemoryViolationStore::new());
    let state = Arc::new(RwLock::new(AppState::new(store)));

    let governor = rate_limit::create_governor_config(&rate_limit::RateLimitConfig::default());
    let app = create_router(state)
        .route(
            "/metrics",
            get(move || async move { prometheus.render() }),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_governor::GovernorLayer { config: governor });

    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_reports_store_counts() {
        let store = Arc::new(InMemoryViolationStore::new());
        let state = Arc::new(RwLock::new(AppState::new(store)));
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["metrics"]["violation_rows"], 0);
    }
}
