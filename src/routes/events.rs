use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::SharedState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// GET /events/history: most recent pool notifications, newest first.
pub async fn event_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let events = state.coordinator.events().history();
    let total = events.len();
    let events: Vec<_> = events.into_iter().rev().take(query.limit).collect();

    Json(serde_json::json!({
        "events": events,
        "total": total,
        "limit": query.limit,
    }))
}

/// GET /events/stream: SSE stream of pool notifications.
pub async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.coordinator.events().subscribe();
    let stream = BroadcastStream::new(rx);

    let event_stream = stream.filter_map(|result| match result {
        Ok(notification) => {
            let data = serde_json::to_string(&notification).unwrap_or_default();
            Some(Ok(Event::default().event("pool").data(data)))
        }
        Err(_) => None, // lagged
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
