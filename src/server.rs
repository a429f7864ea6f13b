use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Client pool
        .route(
            "/clients/register",
            post(crate::routes::clients::register_client),
        )
        .route("/clients", get(crate::routes::clients::list_clients))
        .route(
            "/clients/{name}/results",
            get(crate::routes::clients::last_results)
                .post(crate::routes::clients::record_results),
        )
        // Dispatch
        .route(
            "/scripts/prepare",
            post(crate::routes::scripts::prepare_script),
        )
        .route(
            "/scripts/execute",
            post(crate::routes::scripts::execute_prepared),
        )
        .route(
            "/scripts/dispatch",
            post(crate::routes::scripts::dispatch_script),
        )
        .route("/scripts/done", get(crate::routes::scripts::wait_for_done))
        // Named sync objects
        .route("/objects", get(crate::routes::objects::list_objects))
        .route("/objects/lock", post(crate::routes::objects::lock_object))
        .route(
            "/objects/unlock",
            post(crate::routes::objects::unlock_object),
        )
        .route("/objects/reset", post(crate::routes::objects::reset_event))
        // Pool notifications
        .route(
            "/events/history",
            get(crate::routes::events::event_history),
        )
        .route("/events/stream", get(crate::routes::events::event_stream))
        // Shutdown
        .route("/shutdown", post(crate::routes::shutdown::shut_down))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
