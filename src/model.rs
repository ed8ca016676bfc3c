//! Record types stored by the service and the bundle shapes used by
//! snapshot/restore.
//!
//! Records serialize in camelCase with their identity under `id`. Artifacts
//! written by older deployments used `_id`, which is accepted on read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three collections tracked by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Customers,
    Feedbacks,
    Responses,
}

impl Collection {
    /// Dependency order used when repopulating the store.
    pub const ALL: [Collection; 3] = [Self::Customers, Self::Feedbacks, Self::Responses];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Feedbacks => "feedbacks",
            Self::Responses => "responses",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    #[serde(alias = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// bcrypt hash; kept in artifacts so a restore can re-authenticate users.
    #[serde(default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Last profile modification.
    #[serde(rename = "timeStamp")]
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public projection of a customer; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "timeStamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<&CustomerRecord> for CustomerView {
    fn from(record: &CustomerRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            email: record.email.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    #[serde(alias = "_id")]
    pub id: Uuid,
    /// Submitting customer. Unique across the collection.
    pub customer_email: String,
    pub message: String,
    pub satisfaction: u8,
    #[serde(rename = "timeStamp")]
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(customer_email: impl Into<String>, message: impl Into<String>, satisfaction: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_email: customer_email.into(),
            message: message.into(),
            satisfaction,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    #[serde(alias = "_id")]
    pub id: Uuid,
    /// Referenced feedback. Not validated by the store.
    pub feedback_id: Uuid,
    pub response_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn new(feedback_id: Uuid, response_message: impl Into<String>, responder: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            feedback_id,
            response_message: response_message.into(),
            responder,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl CustomerPatch {
    pub fn has_changes(&self) -> bool {
        self.name.is_some() || self.email.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackReplacement {
    pub message: String,
    pub satisfaction: u8,
}

#[derive(Debug, Clone, Default)]
pub struct ResponsePatch {
    pub response_message: Option<String>,
    pub responder: Option<String>,
}

/// Full contents of all three collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub customers: Vec<CustomerRecord>,
    pub feedbacks: Vec<FeedbackRecord>,
    pub responses: Vec<ResponseRecord>,
}

impl Dataset {
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            customers: self.customers.len(),
            feedbacks: self.feedbacks.len(),
            responses: self.responses.len(),
        }
    }

    /// Splits the dataset into per-collection batches in dependency order.
    pub fn into_batches(self) -> [RecordBatch; 3] {
        [
            RecordBatch::Customers(self.customers),
            RecordBatch::Feedbacks(self.feedbacks),
            RecordBatch::Responses(self.responses),
        ]
    }
}

/// Per-collection record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub customers: usize,
    pub feedbacks: usize,
    pub responses: usize,
}

/// Records destined for a single collection.
#[derive(Debug, Clone)]
pub enum RecordBatch {
    Customers(Vec<CustomerRecord>),
    Feedbacks(Vec<FeedbackRecord>),
    Responses(Vec<ResponseRecord>),
}

impl RecordBatch {
    pub fn collection(&self) -> Collection {
        match self {
            Self::Customers(_) => Collection::Customers,
            Self::Feedbacks(_) => Collection::Feedbacks,
            Self::Responses(_) => Collection::Responses,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Customers(records) => records.len(),
            Self::Feedbacks(records) => records.len(),
            Self::Responses(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
