// src/handlers/events.rs

use std::convert::Infallible;

use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{
    error::AppError,
    handlers::session::load_entry,
    session::{SessionEvent, SessionRegistry},
    utils::jwt::Claims,
};

/// Server-Sent Events feed of one session: clock ticks, cheating warnings,
/// and the submission outcome.
pub async fn stream_events(
    State(registry): State<SessionRegistry>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let entry = load_entry(&registry, &claims, id).await?;

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));

    let events = broadcast_to_sse(entry.session.subscribe());
    Ok((headers, Sse::new(events).keep_alive(KeepAlive::new())))
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<SessionEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    SessionEvent::Started { .. } => "started",
                    SessionEvent::Tick { .. } => "tick",
                    SessionEvent::Expired => "expired",
                    SessionEvent::CheatingDetected { .. } => "cheating",
                    SessionEvent::Submitting { .. } => "submitting",
                    SessionEvent::Completed { .. } => "completed",
                    SessionEvent::PersistenceFailed { .. } => "persistence_failed",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged
        }
    })
}
