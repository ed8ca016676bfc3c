use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::feed::{FeedEvent, FeedFilter, FeedHub, FeedSubscription};
use super::{ChangeFeed, CollectionStore, RecordStore, StoreError, StoreResult};
use crate::model::{
    Collection, CustomerPatch, CustomerRecord, Dataset, FeedbackRecord, FeedbackReplacement,
    RecordBatch, ResponsePatch, ResponseRecord,
};

#[derive(Debug, Default)]
struct Collections {
    customers: HashMap<Uuid, CustomerRecord>,
    feedbacks: HashMap<Uuid, FeedbackRecord>,
    responses: HashMap<Uuid, ResponseRecord>,
}

impl Collections {
    fn customer_email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.customers
            .values()
            .any(|customer| customer.email == email && Some(customer.id) != except)
    }

    fn feedback_email_taken(&self, email: &str) -> bool {
        self.feedbacks
            .values()
            .any(|feedback| feedback.customer_email == email)
    }
}

/// In-process record store with a filtered fan-out change feed.
///
/// All three collections live behind one lock, so whole-store reads are
/// consistent and [`CollectionStore::replace_all`] is atomic. Feed events are
/// published while the write lock is held, which keeps per-document event
/// order identical to mutation order.
#[derive(Debug)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    feed: FeedHub,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(super::feed::DEFAULT_FEED_CAPACITY)
    }

    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            collections: RwLock::new(Collections::default()),
            feed: FeedHub::new(capacity),
            available: AtomicBool::new(true),
        }
    }

    /// Closes the change feed. Every later read, write or subscribe fails
    /// with [`StoreError::Unavailable`].
    pub fn shutdown(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.feed.close();
    }

    /// Number of live feed subscriptions.
    pub fn feed_subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store has been shut down".to_string()))
        }
    }

    async fn read(&self) -> StoreResult<RwLockReadGuard<'_, Collections>> {
        self.ensure_available()?;
        Ok(self.collections.read().await)
    }

    async fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Collections>> {
        self.ensure_available()?;
        Ok(self.collections.write().await)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document<T: Serialize>(record: &T) -> Option<JsonValue> {
    serde_json::to_value(record).ok()
}

fn field(fields: &mut JsonMap<String, JsonValue>, name: &str, value: impl Serialize) {
    if let Ok(value) = serde_json::to_value(value) {
        fields.insert(name.to_string(), value);
    }
}

fn sorted_oldest_first<T, K: Ord>(records: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut records: Vec<T> = records.collect();
    records.sort_by_key(|record| key(record));
    records
}

fn sorted_newest_first<T, K: Ord>(records: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut records = sorted_oldest_first(records, key);
    records.reverse();
    records
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn read_all(&self) -> StoreResult<Dataset> {
        let collections = self.read().await?;
        Ok(Dataset {
            customers: sorted_oldest_first(collections.customers.values().cloned(), |c| c.created_at),
            feedbacks: sorted_oldest_first(collections.feedbacks.values().cloned(), |f| f.submitted_at),
            responses: sorted_oldest_first(collections.responses.values().cloned(), |r| r.created_at),
        })
    }

    async fn clear(&self, collection: Collection) -> StoreResult<usize> {
        let mut collections = self.write().await?;
        let removed: Vec<Uuid> = match collection {
            Collection::Customers => collections.customers.drain().map(|(id, _)| id).collect(),
            Collection::Feedbacks => collections.feedbacks.drain().map(|(id, _)| id).collect(),
            Collection::Responses => collections.responses.drain().map(|(id, _)| id).collect(),
        };

        for id in &removed {
            self.feed.publish(FeedEvent::delete(collection, *id));
        }
        Ok(removed.len())
    }

    async fn insert_batch(&self, batch: RecordBatch) -> StoreResult<usize> {
        let mut collections = self.write().await?;
        let inserted = batch.len();

        // Validate the whole batch first so a rejected batch leaves nothing behind.
        match &batch {
            RecordBatch::Customers(records) => {
                for record in records {
                    if collections.customers.contains_key(&record.id) {
                        return Err(StoreError::Conflict(format!("duplicate customer id {}", record.id)));
                    }
                    if collections.customer_email_taken(&record.email, None)
                        || records.iter().filter(|other| other.email == record.email).count() > 1
                    {
                        return Err(StoreError::Conflict(format!(
                            "a customer with email {} already exists",
                            record.email
                        )));
                    }
                }
            }
            RecordBatch::Feedbacks(records) => {
                for record in records {
                    if collections.feedbacks.contains_key(&record.id) {
                        return Err(StoreError::Conflict(format!("duplicate feedback id {}", record.id)));
                    }
                    if collections.feedback_email_taken(&record.customer_email)
                        || records
                            .iter()
                            .filter(|other| other.customer_email == record.customer_email)
                            .count()
                            > 1
                    {
                        return Err(StoreError::Conflict(
                            "A feedback from this email already exists".to_string(),
                        ));
                    }
                }
            }
            RecordBatch::Responses(records) => {
                if let Some(record) = records
                    .iter()
                    .find(|record| collections.responses.contains_key(&record.id))
                {
                    return Err(StoreError::Conflict(format!("duplicate response id {}", record.id)));
                }
            }
        }

        match batch {
            RecordBatch::Customers(records) => {
                for record in records {
                    self.feed
                        .publish(FeedEvent::insert(Collection::Customers, record.id, document(&record)));
                    collections.customers.insert(record.id, record);
                }
            }
            RecordBatch::Feedbacks(records) => {
                for record in records {
                    self.feed
                        .publish(FeedEvent::insert(Collection::Feedbacks, record.id, document(&record)));
                    collections.feedbacks.insert(record.id, record);
                }
            }
            RecordBatch::Responses(records) => {
                for record in records {
                    self.feed
                        .publish(FeedEvent::insert(Collection::Responses, record.id, document(&record)));
                    collections.responses.insert(record.id, record);
                }
            }
        }

        Ok(inserted)
    }

    fn supports_atomic_replace(&self) -> bool {
        true
    }

    async fn replace_all(&self, dataset: Dataset) -> StoreResult<()> {
        let mut staged = Collections::default();
        for customer in dataset.customers {
            if staged.customer_email_taken(&customer.email, None) {
                return Err(StoreError::Conflict(format!(
                    "a customer with email {} already exists",
                    customer.email
                )));
            }
            staged.customers.insert(customer.id, customer);
        }
        for feedback in dataset.feedbacks {
            if staged.feedback_email_taken(&feedback.customer_email) {
                return Err(StoreError::Conflict(
                    "A feedback from this email already exists".to_string(),
                ));
            }
            staged.feedbacks.insert(feedback.id, feedback);
        }
        for response in dataset.responses {
            staged.responses.insert(response.id, response);
        }

        let mut collections = self.write().await?;
        let previous = std::mem::replace(&mut *collections, staged);

        for id in previous.customers.keys() {
            self.feed.publish(FeedEvent::delete(Collection::Customers, *id));
        }
        for id in previous.feedbacks.keys() {
            self.feed.publish(FeedEvent::delete(Collection::Feedbacks, *id));
        }
        for id in previous.responses.keys() {
            self.feed.publish(FeedEvent::delete(Collection::Responses, *id));
        }
        for (id, record) in &collections.customers {
            self.feed
                .publish(FeedEvent::insert(Collection::Customers, *id, document(record)));
        }
        for (id, record) in &collections.feedbacks {
            self.feed
                .publish(FeedEvent::insert(Collection::Feedbacks, *id, document(record)));
        }
        for (id, record) in &collections.responses {
            self.feed
                .publish(FeedEvent::insert(Collection::Responses, *id, document(record)));
        }

        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe(&self, filter: FeedFilter) -> StoreResult<FeedSubscription> {
        self.ensure_available()?;
        self.feed
            .subscribe(filter)
            .ok_or_else(|| StoreError::Unavailable("change feed is closed".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_customer(&self, customer: CustomerRecord) -> StoreResult<CustomerRecord> {
        let mut collections = self.write().await?;
        if collections.customer_email_taken(&customer.email, None) {
            return Err(StoreError::Conflict(format!(
                "a customer with email {} already exists",
                customer.email
            )));
        }

        self.feed.publish(FeedEvent::insert(
            Collection::Customers,
            customer.id,
            document(&customer),
        ));
        collections.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn list_customers(&self) -> StoreResult<Vec<CustomerRecord>> {
        let collections = self.read().await?;
        Ok(sorted_newest_first(
            collections.customers.values().cloned(),
            |customer| customer.updated_at,
        ))
    }

    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<CustomerRecord>> {
        let collections = self.read().await?;
        Ok(collections
            .customers
            .values()
            .find(|customer| customer.email == email)
            .cloned())
    }

    async fn update_customer(&self, id: Uuid, patch: CustomerPatch) -> StoreResult<CustomerRecord> {
        let mut collections = self.write().await?;

        if let Some(email) = patch.email.as_deref()
            && collections.customer_email_taken(email, Some(id))
        {
            return Err(StoreError::Conflict(format!(
                "a customer with email {email} already exists"
            )));
        }

        let customer = collections
            .customers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Customers, id))?;

        let mut changed = JsonMap::new();
        if let Some(name) = patch.name {
            field(&mut changed, "name", &name);
            customer.name = name;
        }
        if let Some(email) = patch.email {
            field(&mut changed, "email", &email);
            customer.email = email;
        }
        customer.updated_at = Utc::now();
        field(&mut changed, "timeStamp", customer.updated_at);

        let updated = customer.clone();
        self.feed.publish(FeedEvent::update(
            Collection::Customers,
            id,
            changed,
            document(&updated),
        ));
        Ok(updated)
    }

    async fn delete_customer(&self, id: Uuid) -> StoreResult<()> {
        let mut collections = self.write().await?;
        collections
            .customers
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Customers, id))?;
        self.feed.publish(FeedEvent::delete(Collection::Customers, id));
        Ok(())
    }

    async fn delete_all_customers(&self) -> StoreResult<usize> {
        let mut collections = self.write().await?;
        let removed: Vec<Uuid> = collections.customers.drain().map(|(id, _)| id).collect();
        for id in &removed {
            self.feed.publish(FeedEvent::delete(Collection::Customers, *id));
        }
        Ok(removed.len())
    }

    async fn insert_feedback(&self, feedback: FeedbackRecord) -> StoreResult<FeedbackRecord> {
        let mut collections = self.write().await?;
        if collections.feedback_email_taken(&feedback.customer_email) {
            return Err(StoreError::Conflict(
                "A feedback from this email already exists".to_string(),
            ));
        }

        self.feed.publish(FeedEvent::insert(
            Collection::Feedbacks,
            feedback.id,
            document(&feedback),
        ));
        collections.feedbacks.insert(feedback.id, feedback.clone());
        Ok(feedback)
    }

    async fn list_feedbacks(&self) -> StoreResult<Vec<FeedbackRecord>> {
        let collections = self.read().await?;
        Ok(sorted_newest_first(
            collections.feedbacks.values().cloned(),
            |feedback| feedback.submitted_at,
        ))
    }

    async fn list_feedbacks_by_email(&self, email: &str) -> StoreResult<Vec<FeedbackRecord>> {
        let collections = self.read().await?;
        Ok(sorted_newest_first(
            collections
                .feedbacks
                .values()
                .filter(|feedback| feedback.customer_email == email)
                .cloned(),
            |feedback| feedback.submitted_at,
        ))
    }

    async fn update_feedback_message(&self, id: Uuid, message: String) -> StoreResult<FeedbackRecord> {
        let mut collections = self.write().await?;
        let feedback = collections
            .feedbacks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Feedbacks, id))?;

        let mut changed = JsonMap::new();
        field(&mut changed, "message", &message);
        feedback.message = message;

        let updated = feedback.clone();
        self.feed.publish(FeedEvent::update(
            Collection::Feedbacks,
            id,
            changed,
            document(&updated),
        ));
        Ok(updated)
    }

    async fn replace_feedback(
        &self,
        id: Uuid,
        replacement: FeedbackReplacement,
    ) -> StoreResult<FeedbackRecord> {
        let mut collections = self.write().await?;
        let feedback = collections
            .feedbacks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Feedbacks, id))?;

        *feedback = FeedbackRecord {
            id,
            customer_email: feedback.customer_email.clone(),
            message: replacement.message,
            satisfaction: replacement.satisfaction,
            submitted_at: feedback.submitted_at,
        };

        let replaced = feedback.clone();
        self.feed.publish(FeedEvent::replace(
            Collection::Feedbacks,
            id,
            document(&replaced),
        ));
        Ok(replaced)
    }

    async fn delete_feedback(&self, id: Uuid) -> StoreResult<()> {
        let mut collections = self.write().await?;
        collections
            .feedbacks
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Feedbacks, id))?;
        self.feed.publish(FeedEvent::delete(Collection::Feedbacks, id));
        Ok(())
    }

    async fn insert_response(&self, response: ResponseRecord) -> StoreResult<ResponseRecord> {
        let mut collections = self.write().await?;
        self.feed.publish(FeedEvent::insert(
            Collection::Responses,
            response.id,
            document(&response),
        ));
        collections.responses.insert(response.id, response.clone());
        Ok(response)
    }

    async fn list_responses(&self) -> StoreResult<Vec<ResponseRecord>> {
        let collections = self.read().await?;
        Ok(sorted_newest_first(
            collections.responses.values().cloned(),
            |response| response.created_at,
        ))
    }

    async fn update_response(&self, id: Uuid, patch: ResponsePatch) -> StoreResult<ResponseRecord> {
        let mut collections = self.write().await?;
        let response = collections
            .responses
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Responses, id))?;

        let mut changed = JsonMap::new();
        if let Some(message) = patch.response_message {
            field(&mut changed, "responseMessage", &message);
            response.response_message = message;
        }
        if let Some(responder) = patch.responder {
            field(&mut changed, "responder", &responder);
            response.responder = Some(responder);
        }

        let updated = response.clone();
        self.feed.publish(FeedEvent::update(
            Collection::Responses,
            id,
            changed,
            document(&updated),
        ));
        Ok(updated)
    }

    async fn delete_response(&self, id: Uuid) -> StoreResult<()> {
        let mut collections = self.write().await?;
        collections
            .responses
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(Collection::Responses, id))?;
        self.feed.publish(FeedEvent::delete(Collection::Responses, id));
        Ok(())
    }
}
