use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::pool::{ClientState, PoolStatus};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub accepting: bool,
    pub clients: ClientCounts,
    pub objects: usize,
    pub pool: PoolStatus,
    pub coordinator: CoordinatorInfo,
}

#[derive(Serialize)]
pub struct ClientCounts {
    pub registered: usize,
    pub executing: usize,
    pub reported: usize,
}

#[derive(Serialize)]
pub struct CoordinatorInfo {
    pub version: String,
    pub port: u16,
    pub writers: WriterTargets,
}

#[derive(Serialize)]
pub struct WriterTargets {
    pub results_dir: Option<String>,
    pub database: Option<String>,
}

/// GET /health: pool snapshot for drivers and operators.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let coordinator = &state.coordinator;
    let clients = coordinator.clients().await;
    let in_state = |s: ClientState| clients.iter().filter(|c| c.state == s).count();

    let accepting = coordinator.is_accepting();
    Json(HealthResponse {
        status: if accepting { "ok" } else { "draining" }.to_string(),
        accepting,
        clients: ClientCounts {
            registered: clients
                .iter()
                .filter(|c| c.state != ClientState::Unregistered)
                .count(),
            executing: in_state(ClientState::Executing),
            reported: in_state(ClientState::ReportedResults),
        },
        objects: coordinator.registry().len(),
        pool: coordinator.status(),
        coordinator: CoordinatorInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            port: state.config.port,
            writers: WriterTargets {
                results_dir: state
                    .config
                    .results_dir
                    .as_ref()
                    .map(|p| p.display().to_string()),
                database: state
                    .config
                    .database
                    .as_ref()
                    .map(|p| p.display().to_string()),
            },
        },
    })
}
