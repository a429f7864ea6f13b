use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CoordinatorError, Result};
use crate::pool::{ClientSnapshot, HttpDriverClient};
use crate::results::{RunData, RunResults};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    /// Base URL the coordinator calls back for prepare/execute/shutdown.
    pub callback_url: String,
}

/// POST /clients/register
pub async fn register_client(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>> {
    let driver = HttpDriverClient::new(
        req.name.clone(),
        &req.callback_url,
        state.config.driver_timeout,
    )?;
    state.coordinator.register_client(Arc::new(driver)).await?;

    Ok(Json(serde_json::json!({
        "registered": req.name,
        "callback_url": req.callback_url,
    })))
}

/// GET /clients
pub async fn list_clients(State(state): State<SharedState>) -> Json<Vec<ClientSnapshot>> {
    Json(state.coordinator.clients().await)
}

/// POST /clients/{name}/results: a driver reports its finished run.
pub async fn record_results(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(report): Json<RunData>,
) -> Result<Json<serde_json::Value>> {
    let results = RunResults::from_report(report)?;
    let counters = results.counters();
    debug!("{} reported {} cases", name, counters.cases);
    state.coordinator.record_results(&name, results).await?;
    let status = state.coordinator.status();

    Ok(Json(serde_json::json!({
        "recorded": true,
        "cases": counters.cases,
        "reported": status.reported,
        "expected": status.expected,
        "pool_done": status.done,
    })))
}

/// GET /clients/{name}/results: the last run a driver reported.
pub async fn last_results(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let results = state
        .coordinator
        .results_for(&name)
        .await?
        .ok_or_else(|| CoordinatorError::illegal(format!("client '{}' has not reported", name)))?;
    Ok(Json(serde_json::to_value(results.as_ref())?))
}
