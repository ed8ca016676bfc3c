//! Record store capabilities.
//!
//! The store is consumed through three narrow traits so that snapshot,
//! restore and change streaming never depend on the CRUD surface:
//!
//! - [`CollectionStore`]: bulk reads/writes over whole collections
//! - [`ChangeFeed`]: filtered, cancellable mutation feed
//! - [`RecordStore`]: per-record CRUD used by the HTTP handlers

pub mod feed;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Collection, CustomerPatch, CustomerRecord, Dataset, FeedbackRecord, FeedbackReplacement,
    RecordBatch, ResponsePatch, ResponseRecord,
};

pub use feed::{FeedError, FeedEvent, FeedFilter, FeedSubscription, OperationKind};
pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: Uuid },

    #[error("{0}")]
    Conflict(String),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),

    #[error("store rejected the write: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn not_found(collection: Collection, id: Uuid) -> Self {
        Self::NotFound { collection, id }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Whole-collection access used by snapshot and restore.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Reads every document of every collection.
    async fn read_all(&self) -> StoreResult<Dataset>;

    /// Removes every document of one collection, returning how many were removed.
    async fn clear(&self, collection: Collection) -> StoreResult<usize>;

    /// Inserts records with their identities preserved.
    async fn insert_batch(&self, batch: RecordBatch) -> StoreResult<usize>;

    /// Whether [`CollectionStore::replace_all`] swaps all collections atomically.
    fn supports_atomic_replace(&self) -> bool {
        false
    }

    /// Replaces the contents of all collections in one isolated step.
    async fn replace_all(&self, _dataset: Dataset) -> StoreResult<()> {
        Err(StoreError::Unsupported("atomic replace"))
    }
}

/// Store-provided mutation feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription. Dropping the returned handle cancels it.
    async fn subscribe(&self, filter: FeedFilter) -> StoreResult<FeedSubscription>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_customer(&self, customer: CustomerRecord) -> StoreResult<CustomerRecord>;
    async fn list_customers(&self) -> StoreResult<Vec<CustomerRecord>>;
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<CustomerRecord>>;
    async fn update_customer(&self, id: Uuid, patch: CustomerPatch) -> StoreResult<CustomerRecord>;
    async fn delete_customer(&self, id: Uuid) -> StoreResult<()>;
    /// Removes every customer, returning how many were removed.
    async fn delete_all_customers(&self) -> StoreResult<usize>;

    async fn insert_feedback(&self, feedback: FeedbackRecord) -> StoreResult<FeedbackRecord>;
    async fn list_feedbacks(&self) -> StoreResult<Vec<FeedbackRecord>>;
    async fn list_feedbacks_by_email(&self, email: &str) -> StoreResult<Vec<FeedbackRecord>>;
    async fn update_feedback_message(&self, id: Uuid, message: String) -> StoreResult<FeedbackRecord>;
    async fn replace_feedback(
        &self,
        id: Uuid,
        replacement: FeedbackReplacement,
    ) -> StoreResult<FeedbackRecord>;
    async fn delete_feedback(&self, id: Uuid) -> StoreResult<()>;

    async fn insert_response(&self, response: ResponseRecord) -> StoreResult<ResponseRecord>;
    async fn list_responses(&self) -> StoreResult<Vec<ResponseRecord>>;
    async fn update_response(&self, id: Uuid, patch: ResponsePatch) -> StoreResult<ResponseRecord>;
    async fn delete_response(&self, id: Uuid) -> StoreResult<()>;
}
