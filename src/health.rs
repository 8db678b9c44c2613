use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

/// Shared liveness state updated by the orchestrator loop on every tick. A separate
/// axum task serves it so a stalled strategy loop is externally observable without
/// touching the engine's internals.
#[derive(Clone)]
pub struct HealthState(Arc<Inner>);

struct Inner {
    last_tick_ms: AtomicI64,
    active_events: AtomicUsize,
    started_at_ms: i64,
}

impl HealthState {
    pub fn new(started_at_ms: i64) -> Self {
        Self(Arc::new(Inner {
            last_tick_ms: AtomicI64::new(started_at_ms),
            active_events: AtomicUsize::new(0),
            started_at_ms,
        }))
    }

    pub fn record_tick(&self, now_ms: i64, active_events: usize) {
        self.0.last_tick_ms.store(now_ms, Ordering::Relaxed);
        self.0.active_events.store(active_events, Ordering::Relaxed);
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_ms: i64,
    last_tick_ms: i64,
    active_events: usize,
}

async fn healthz(State(state): State<HealthState>) -> Json<HealthResponse> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    Json(HealthResponse {
        status: "ok",
        uptime_ms: now_ms - state.0.started_at_ms,
        last_tick_ms: state.0.last_tick_ms.load(Ordering::Relaxed),
        active_events: state.0.active_events.load(Ordering::Relaxed),
    })
}

async fn ok() -> &'static str {
    "OK"
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(ok))
        .route("/health", get(ok))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn serve(port: u16, state: HealthState) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[HEALTH] failed to bind {addr}: {e}, health endpoint disabled");
            return;
        }
    };
    eprintln!("[HEALTH] listening on {addr}");
    if let Err(e) = axum::serve(listener, router(state)).await {
        eprintln!("[HEALTH] server error: {e}");
    }
}
