use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;
use crate::pool::{ConfigurationId, ScriptDocument};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub configuration: ConfigurationId,
}

#[derive(Deserialize)]
pub struct WaitQuery {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// POST /scripts/prepare: first phase, drivers set the script up.
pub async fn prepare_script(
    State(state): State<SharedState>,
    Json(script): Json<ScriptDocument>,
) -> Result<Json<serde_json::Value>> {
    let configuration = state.coordinator.prepare_script(script).await?;
    Ok(Json(serde_json::json!({
        "configuration": configuration,
        "prepared": true,
    })))
}

/// POST /scripts/execute: second phase, start the measured run.
pub async fn execute_prepared(
    State(state): State<SharedState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .coordinator
        .execute_prepared_script(req.configuration)
        .await?;
    Ok(Json(serde_json::json!({
        "configuration": req.configuration,
        "executing": true,
    })))
}

/// POST /scripts/dispatch: prepare and execute in one go.
pub async fn dispatch_script(
    State(state): State<SharedState>,
    Json(script): Json<ScriptDocument>,
) -> Result<Json<serde_json::Value>> {
    let configuration = state.coordinator.execute_script(script).await?;
    Ok(Json(serde_json::json!({
        "configuration": configuration,
        "executing": true,
    })))
}

/// GET /scripts/done: wait on the pool-done barrier.
pub async fn wait_for_done(
    State(state): State<SharedState>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<serde_json::Value>> {
    let done = state
        .coordinator
        .wait_for_pool_done(Duration::from_millis(query.timeout_ms))
        .await?;
    Ok(Json(serde_json::json!({
        "done": done,
        "pool": state.coordinator.status(),
    })))
}
