use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::registry::{ConnectionRegistry, SubscriptionLease};
use crate::error::{AppError, AppResult};
use crate::model::Collection;
use crate::store::{ChangeFeed, FeedError, FeedEvent, FeedFilter, FeedSubscription, OperationKind, StoreError};

pub const DEFAULT_STREAM_BUFFER: usize = 16;

/// Operation kinds forwarded to change stream clients.
pub const WATCHED_OPERATIONS: [OperationKind; 3] = [
    OperationKind::Update,
    OperationKind::Replace,
    OperationKind::Delete,
];

/// Normalized mutation sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub operation_type: OperationKind,
    pub timestamp: DateTime<Utc>,
    pub document_id: Uuid,
    /// Changed fields for `update`, the whole document otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_document: Option<JsonValue>,
}

impl From<FeedEvent> for ChangeEvent {
    fn from(event: FeedEvent) -> Self {
        let changes = event
            .updated_fields
            .map(JsonValue::Object)
            .or_else(|| event.full_document.clone());

        Self {
            operation_type: event.operation,
            timestamp: Utc::now(),
            document_id: event.document_id,
            changes,
            full_document: event.full_document,
        }
    }
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Change(ChangeEvent),
    Error { error: String, details: String },
}

impl StreamFrame {
    fn feed_error(err: &FeedError) -> Self {
        Self::Error {
            error: "Stream error occurred".to_string(),
            details: err.to_string(),
        }
    }

    /// JSON payload of the frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            warn!(error = %err, "failed to serialize stream frame");
            r#"{"error":"Stream error occurred"}"#.to_string()
        })
    }

    /// Full text/event-stream framing: `data: <JSON>\n\n`.
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            Self::Change(event) => Some(event.operation_type),
            Self::Error { .. } => None,
        }
    }
}

/// Why a bridge stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The watched record was deleted.
    Deleted,
    /// The client went away.
    Disconnected,
    /// The feed failed or ended.
    FeedError(String),
}

/// Client side of an open bridge.
///
/// Frames end when the bridge closes. Dropping the stream counts as a
/// client disconnect and releases the feed subscription.
#[derive(Debug)]
pub struct ChangeStream {
    subscription_id: u64,
    frames: mpsc::Receiver<StreamFrame>,
    task: JoinHandle<CloseReason>,
}

impl ChangeStream {
    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }

    pub async fn next_frame(&mut self) -> Option<StreamFrame> {
        self.frames.recv().await
    }

    pub fn into_parts(self) -> (ReceiverStream<StreamFrame>, JoinHandle<CloseReason>) {
        (ReceiverStream::new(self.frames), self.task)
    }
}

/// Bridges a per-record change feed subscription to one client stream.
///
/// `open` moves a request from idle to subscribed: the feed subscription is
/// established before anything is returned, so failures surface as ordinary
/// errors rather than a broken stream. A spawned task then forwards events
/// until the record is deleted, the client disconnects or the feed fails. The
/// subscription and its registry entry are released on every one of those
/// paths.
pub struct ChangeSubscriptionBridge {
    feed: Arc<dyn ChangeFeed>,
    registry: ConnectionRegistry,
    buffer: usize,
}

impl ChangeSubscriptionBridge {
    pub fn new(feed: Arc<dyn ChangeFeed>, registry: ConnectionRegistry, buffer: usize) -> Self {
        Self {
            feed,
            registry,
            buffer: buffer.max(1),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn open(&self, document_id: Uuid) -> AppResult<ChangeStream> {
        let filter = FeedFilter::collection(Collection::Feedbacks)
            .document(document_id)
            .operations(WATCHED_OPERATIONS);

        let subscription = self.feed.subscribe(filter).await.map_err(|err| match err {
            StoreError::Unavailable(message) => AppError::StoreUnavailable(message),
            other => AppError::Stream(other.to_string()),
        })?;

        let lease = self.registry.register(document_id);
        let subscription_id = lease.subscription_id();
        let (sender, frames) = mpsc::channel(self.buffer);

        info!(%document_id, subscription_id, "change stream opened");
        let task = tokio::spawn(forward(document_id, subscription, lease, sender));

        Ok(ChangeStream {
            subscription_id,
            frames,
            task,
        })
    }
}

async fn forward(
    document_id: Uuid,
    mut subscription: FeedSubscription,
    lease: SubscriptionLease,
    frames: mpsc::Sender<StreamFrame>,
) -> CloseReason {
    let subscription_id = lease.subscription_id();

    let reason = loop {
        tokio::select! {
            biased;

            () = frames.closed() => break CloseReason::Disconnected,

            next = subscription.next_event() => match next {
                Ok(event) => {
                    let terminal = event.operation == OperationKind::Delete;
                    debug!(%document_id, subscription_id, operation = %event.operation, "forwarding change");

                    if frames.send(StreamFrame::Change(event.into())).await.is_err() {
                        break CloseReason::Disconnected;
                    }
                    if terminal {
                        break CloseReason::Deleted;
                    }
                }
                Err(err) => {
                    warn!(%document_id, subscription_id, error = %err, "change feed error");
                    let _ = frames.send(StreamFrame::feed_error(&err)).await;
                    break CloseReason::FeedError(err.to_string());
                }
            },
        }
    };

    drop(subscription);
    drop(lease);
    info!(%document_id, subscription_id, reason = ?reason, "change stream closed");
    reason
}
