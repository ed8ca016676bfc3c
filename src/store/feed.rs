//! Change feed primitives.
//!
//! [`FeedHub`] fans store mutations out to subscribers. Each subscriber has
//! its own bounded queue and filter; events are matched before they are
//! queued, so traffic on other records never takes up a subscriber's buffer.
//! Subscribers receive a [`FeedSubscription`], which is cancelled by dropping
//! it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::model::Collection;

/// Matching events buffered per subscription. A subscriber that falls further
/// behind than this observes [`FeedError::Lagged`] after draining its queue.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Replace,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation observed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub collection: Collection,
    pub operation: OperationKind,
    pub document_id: Uuid,
    /// Changed fields, present on `update` only.
    pub updated_fields: Option<JsonMap<String, JsonValue>>,
    /// Post-mutation document; absent on `delete`.
    pub full_document: Option<JsonValue>,
}

impl FeedEvent {
    pub fn insert(collection: Collection, document_id: Uuid, document: Option<JsonValue>) -> Self {
        Self {
            collection,
            operation: OperationKind::Insert,
            document_id,
            updated_fields: None,
            full_document: document,
        }
    }

    pub fn update(
        collection: Collection,
        document_id: Uuid,
        updated_fields: JsonMap<String, JsonValue>,
        document: Option<JsonValue>,
    ) -> Self {
        Self {
            collection,
            operation: OperationKind::Update,
            document_id,
            updated_fields: Some(updated_fields),
            full_document: document,
        }
    }

    pub fn replace(collection: Collection, document_id: Uuid, document: Option<JsonValue>) -> Self {
        Self {
            collection,
            operation: OperationKind::Replace,
            document_id,
            updated_fields: None,
            full_document: document,
        }
    }

    pub fn delete(collection: Collection, document_id: Uuid) -> Self {
        Self {
            collection,
            operation: OperationKind::Delete,
            document_id,
            updated_fields: None,
            full_document: None,
        }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub collection: Collection,
    pub document_id: Option<Uuid>,
    /// Empty means every operation kind.
    pub operations: Vec<OperationKind>,
}

impl FeedFilter {
    pub fn collection(collection: Collection) -> Self {
        Self {
            collection,
            document_id: None,
            operations: Vec::new(),
        }
    }

    pub fn document(mut self, id: Uuid) -> Self {
        self.document_id = Some(id);
        self
    }

    pub fn operations(mut self, operations: impl IntoIterator<Item = OperationKind>) -> Self {
        self.operations = operations.into_iter().collect();
        self
    }

    pub fn matches(&self, event: &FeedEvent) -> bool {
        event.collection == self.collection
            && self.document_id.is_none_or(|id| id == event.document_id)
            && (self.operations.is_empty() || self.operations.contains(&event.operation))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("change feed fell behind and dropped {0} events")]
    Lagged(u64),

    #[error("change feed closed")]
    Closed,
}

/// Cancellable stream of feed events. Dropping it releases the subscription.
pub struct FeedSubscription {
    events: BoxStream<'static, Result<FeedEvent, FeedError>>,
}

impl FeedSubscription {
    pub fn new(events: BoxStream<'static, Result<FeedEvent, FeedError>>) -> Self {
        Self { events }
    }

    /// Waits for the next matching event. A finished stream is reported as
    /// [`FeedError::Closed`].
    pub async fn next_event(&mut self) -> Result<FeedEvent, FeedError> {
        match self.events.next().await {
            Some(item) => item,
            None => Err(FeedError::Closed),
        }
    }
}

impl fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSubscription").finish_non_exhaustive()
    }
}

struct Subscriber {
    filter: FeedFilter,
    sender: mpsc::Sender<FeedEvent>,
    missed: Arc<AtomicU64>,
}

impl Subscriber {
    /// Queues a matching event. Returns `false` once the subscriber should be
    /// dropped from the hub.
    fn offer(&self, event: &FeedEvent) -> bool {
        if !self.filter.matches(event) {
            return !self.sender.is_closed();
        }

        match self.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.missed.fetch_add(1, Ordering::AcqRel);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Fan-out hub publishing store mutations.
pub struct FeedHub {
    capacity: usize,
    subscribers: Mutex<Option<Vec<Subscriber>>>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Some(Vec::new())),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Option<Vec<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Never blocks. A subscriber whose queue is full is disconnected and
    /// reports [`FeedError::Lagged`] once it has drained what was queued.
    pub fn publish(&self, event: FeedEvent) {
        if let Some(subscribers) = self.subscribers().as_mut() {
            subscribers.retain(|subscriber| subscriber.offer(&event));
        }
    }

    /// Returns `None` once the hub has been closed.
    pub fn subscribe(&self, filter: FeedFilter) -> Option<FeedSubscription> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let missed = Arc::new(AtomicU64::new(0));

        self.subscribers().as_mut()?.push(Subscriber {
            filter,
            sender,
            missed: missed.clone(),
        });

        let ended = stream::once(async move {
            match missed.load(Ordering::Acquire) {
                0 => Err(FeedError::Closed),
                dropped => Err(FeedError::Lagged(dropped)),
            }
        });
        let events = ReceiverStream::new(receiver).map(Ok).chain(ended).boxed();

        Some(FeedSubscription::new(events))
    }

    /// Closes the hub. Live subscriptions observe [`FeedError::Closed`] after
    /// their queued events.
    pub fn close(&self) {
        self.subscribers().take();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().as_mut().map_or(0, |subscribers| {
            subscribers.retain(|subscriber| !subscriber.sender.is_closed());
            subscribers.len()
        })
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl fmt::Debug for FeedHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHub")
            .field("capacity", &self.capacity)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filter_drops_other_documents_and_operations() {
        let hub = FeedHub::new(16);
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut subscription = hub
            .subscribe(
                FeedFilter::collection(Collection::Feedbacks)
                    .document(watched)
                    .operations([OperationKind::Update, OperationKind::Delete]),
            )
            .expect("hub is open");

        hub.publish(FeedEvent::delete(Collection::Feedbacks, other));
        hub.publish(FeedEvent::insert(Collection::Feedbacks, watched, None));
        hub.publish(FeedEvent::delete(Collection::Responses, watched));
        hub.publish(FeedEvent::delete(Collection::Feedbacks, watched));

        let event = subscription.next_event().await.expect("event delivered");
        assert_eq!(event.document_id, watched);
        assert_eq!(event.operation, OperationKind::Delete);
        assert_eq!(event.collection, Collection::Feedbacks);
    }

    #[tokio::test]
    async fn dropping_subscription_releases_receiver() {
        let hub = FeedHub::default();
        let subscription = hub
            .subscribe(FeedFilter::collection(Collection::Feedbacks))
            .expect("hub is open");
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closing_hub_ends_subscriptions() {
        let hub = FeedHub::default();
        let mut subscription = hub
            .subscribe(FeedFilter::collection(Collection::Feedbacks))
            .expect("hub is open");

        hub.close();

        assert_eq!(subscription.next_event().await, Err(FeedError::Closed));
        assert!(hub.subscribe(FeedFilter::collection(Collection::Feedbacks)).is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_sees_lag() {
        let hub = FeedHub::new(2);
        let id = Uuid::new_v4();
        let mut subscription = hub
            .subscribe(FeedFilter::collection(Collection::Feedbacks))
            .expect("hub is open");

        for _ in 0..5 {
            hub.publish(FeedEvent::replace(Collection::Feedbacks, id, None));
        }

        // Queued events are still delivered before the lag is reported.
        assert!(subscription.next_event().await.is_ok());
        assert!(subscription.next_event().await.is_ok());
        assert_eq!(subscription.next_event().await, Err(FeedError::Lagged(1)));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unrelated_traffic_does_not_fill_the_queue() {
        let hub = FeedHub::new(4);
        let watched = Uuid::new_v4();
        let mut subscription = hub
            .subscribe(FeedFilter::collection(Collection::Feedbacks).document(watched))
            .expect("hub is open");

        for _ in 0..300 {
            hub.publish(FeedEvent::insert(Collection::Customers, Uuid::new_v4(), None));
            hub.publish(FeedEvent::delete(Collection::Feedbacks, Uuid::new_v4()));
        }
        hub.publish(FeedEvent::delete(Collection::Feedbacks, watched));

        let event = subscription.next_event().await.expect("watched event delivered");
        assert_eq!(event.document_id, watched);
        assert_eq!(event.operation, OperationKind::Delete);
        assert_eq!(hub.subscriber_count(), 1);
    }
}
