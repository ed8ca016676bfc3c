use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use futures::StreamExt;
use http::{HeaderName, header};
use serde::Serialize;
use tracing::debug;

use super::parse_id;
use crate::{error::AppResult, state::AppState, stream::ActiveSubscription};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Debug, Serialize)]
pub struct ActiveStreams {
    pub active: usize,
    pub subscriptions: Vec<ActiveSubscription>,
}

/// Streams update, replace and delete events for one feedback record.
///
/// The response body ends after the delete frame or an error frame. Dropping
/// the connection stops the forwarding task and frees the feed subscription.
pub async fn open_feedback_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let document_id = parse_id(&id, "feedback")?;
    let stream = state.bridge.open(document_id).await?;
    debug!(%document_id, subscription_id = stream.subscription_id(), "streaming feedback changes");

    let (frames, _task) = stream.into_parts();
    let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_json())));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events),
    )
        .into_response())
}

pub async fn active_streams(State(state): State<AppState>) -> Json<ActiveStreams> {
    let registry = state.bridge.registry();
    let subscriptions = registry.active();
    Json(ActiveStreams {
        active: subscriptions.len(),
        subscriptions,
    })
}
