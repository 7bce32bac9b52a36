//! Liveness and readiness endpoints

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// Health check - GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness check - GET /health/ready
///
/// Pings every backing store; 503 if any of them fails.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut checks = BTreeMap::new();
    let mut ready = true;

    for probe in state.probes.iter() {
        let status = match probe.ping().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                warn!("Readiness probe {} failed: {}", probe.name(), e);
                ready = false;
                format!("error: {}", e)
            }
        };
        checks.insert(probe.name(), status);
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}
