//! Server-Sent Events over the engine's broadcast feeds.

use std::str::FromStr;

use actix_web::{HttpResponse, web, web::Bytes};
use futures::Stream;
use futures::stream::unfold;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::AttendanceEngine;
use crate::auth::auth::AuthUser;
use crate::error::EngineError;
use crate::store::Collection;

/// One SSE frame: `event: <name>` then the JSON payload.
fn sse_frame<T: Serialize>(event: &str, payload: &T) -> Option<Bytes> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(Bytes::from(format!("event: {event}\ndata: {data}\n\n"))),
        Err(e) => {
            tracing::error!(error = %e, event, "Failed to encode live event");
            None
        }
    }
}

/// Turns a broadcast receiver into an SSE body. Lagging clients skip what they
/// missed and keep going; the stream ends when the sender is gone.
fn sse_stream<T>(
    rx: broadcast::Receiver<T>,
    event: &'static str,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>>
where
    T: Clone + Serialize + Send + 'static,
{
    unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => {
                    if let Some(frame) = sse_frame(event, &item) {
                        return Some((Ok(frame), rx));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, event, "Live client lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn event_stream_response<S>(stream: S) -> HttpResponse
where
    S: Stream<Item = Result<Bytes, actix_web::Error>> + 'static,
{
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

/// Live change feed of one collection
#[utoipa::path(
    get,
    path = "/api/live/{collection}",
    params(("collection" = String, Path, description = "zones | attendance | permissions")),
    responses(
        (status = 200, description = "text/event-stream of change events"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown collection")
    ),
    tag = "Live"
)]
pub async fn collection_feed(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    auth.require_supervisor()?;

    let collection = Collection::from_str(&path)
        .map_err(|_| EngineError::not_found(format!("unknown collection {path}")))?;
    tracing::info!(%collection, user_id = %auth.user_id, "Live feed opened");

    Ok(event_stream_response(sse_stream(
        engine.subscribe(collection),
        "change",
    )))
}

/// Live presence transitions of all users
#[utoipa::path(
    get,
    path = "/api/live/presence",
    responses(
        (status = 200, description = "text/event-stream of presence transitions"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Live"
)]
pub async fn presence_feed(
    auth: AuthUser,
    engine: web::Data<AttendanceEngine>,
) -> actix_web::Result<HttpResponse> {
    auth.require_supervisor()?;

    Ok(event_stream_response(sse_stream(
        engine.presence_transitions(),
        "presence",
    )))
}
