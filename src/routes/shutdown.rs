use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ShutdownRequest {
    /// Drain the running configuration and notify drivers first.
    #[serde(default)]
    pub wait: bool,
    /// Upper bound on draining; the configured drain timeout otherwise.
    pub timeout_ms: Option<u64>,
}

/// POST /shutdown?wait=true&timeout_ms=
pub async fn shut_down(
    State(state): State<SharedState>,
    Query(req): Query<ShutdownRequest>,
) -> Result<Json<serde_json::Value>> {
    info!("Shutdown requested over HTTP (wait={})", req.wait);
    let drained = if req.wait {
        let timeout = req
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(state.config.drain_timeout);
        state.coordinator.shut_down_draining(timeout).await?
    } else {
        state.coordinator.shut_down(false).await?;
        false
    };
    Ok(Json(serde_json::json!({
        "shutdown": true,
        "waited": req.wait,
        "drained": drained,
    })))
}
