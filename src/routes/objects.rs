use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::pool::LockRequest;
use crate::sync::registry::ObjectEntry;
use crate::sync::{LockContext, ObjectScope};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ObjectRequest {
    pub client: String,
    pub script: String,
    #[serde(flatten)]
    pub request: LockRequest,
}

impl ObjectRequest {
    fn context(&self) -> LockContext {
        LockContext::new(self.client.clone(), self.script.clone())
    }
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub client: String,
    pub script: String,
    pub name: String,
    #[serde(default)]
    pub scope: ObjectScope,
}

/// GET /objects
pub async fn list_objects(State(state): State<SharedState>) -> Json<Vec<ObjectEntry>> {
    Json(state.coordinator.registry().entries())
}

/// POST /objects/lock: blocks until granted or the wait runs out.
pub async fn lock_object(
    State(state): State<SharedState>,
    Json(body): Json<ObjectRequest>,
) -> Result<Json<serde_json::Value>> {
    let acquired = state
        .coordinator
        .lock_object(&body.context(), &body.request)
        .await?;
    Ok(Json(serde_json::json!({
        "name": body.request.name,
        "acquired": acquired,
    })))
}

/// POST /objects/unlock
pub async fn unlock_object(
    State(state): State<SharedState>,
    Json(body): Json<ObjectRequest>,
) -> Result<Json<serde_json::Value>> {
    let released = state
        .coordinator
        .unlock_object(&body.context(), &body.request)
        .await?;
    Ok(Json(serde_json::json!({
        "name": body.request.name,
        "released": released,
    })))
}

/// POST /objects/reset: clears a signalled event.
pub async fn reset_event(
    State(state): State<SharedState>,
    Json(body): Json<ResetRequest>,
) -> Result<Json<serde_json::Value>> {
    let ctx = LockContext::new(body.client, body.script);
    state
        .coordinator
        .reset_event(&ctx, &body.name, body.scope)
        .await?;
    Ok(Json(serde_json::json!({
        "name": body.name,
        "reset": true,
    })))
}
