use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;
use tracing::info;

/// Readiness check consulted by [`probe_router`].
pub trait Probe: Send + Sync + 'static {
    fn ready(&self) -> bool;
}

/// Startup probe handler. Always 200.
pub async fn ready() -> StatusCode {
    info!("HTTP startup probe succeeded");
    StatusCode::OK
}

/// Liveness probe handler. Always 200.
pub async fn healthy() -> StatusCode {
    info!("HTTP liveness probe succeeded");
    StatusCode::OK
}

async fn readiness(State(probe): State<Arc<dyn Probe>>) -> StatusCode {
    if probe.ready() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// `/startup` and `/healthz` always succeed; `/ready` asks `probe`.
pub fn probe_router(probe: Arc<dyn Probe>) -> Router {
    Router::new()
        .route("/startup", get(ready))
        .route("/healthz", get(healthy))
        .route("/ready", get(readiness))
        .with_state(probe)
}
