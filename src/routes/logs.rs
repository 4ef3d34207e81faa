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
    /// Only entries emitted for this audit.
    pub audit_id: Option<String>,
}

fn default_limit() -> usize {
    100
}

/// GET /logs/history: recent pipeline events, newest first.
pub async fn log_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let entries = match &query.audit_id {
        Some(id) => state.logs.history_for(id).await,
        None => state.logs.history().await,
    };
    let total = entries.len();
    let entries: Vec<_> = entries.into_iter().rev().take(query.limit).collect();

    Json(serde_json::json!({
        "entries": entries,
        "total": total,
        "limit": query.limit,
    }))
}

/// GET /logs/stream: SSE stream of pipeline events as they happen. The
/// stream ends on shutdown so graceful shutdown is not held open by clients.
pub async fn log_stream(
    State(state): State<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.logs.subscribe();
    let mut shutdown = state.shutdown_tx.subscribe();
    let stream = BroadcastStream::new(rx);

    let event_stream = stream.filter_map(|result| match result {
        Ok(entry) => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().event("log").data(data)))
        }
        Err(_) => None, // lagged
    });
    let event_stream = futures::StreamExt::take_until(event_stream, async move {
        let _ = shutdown.recv().await;
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
