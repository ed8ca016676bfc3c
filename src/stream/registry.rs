use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One open change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    pub subscription_id: u64,
    pub document_id: Uuid,
    pub opened_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, ActiveSubscription>>,
}

impl RegistryInner {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ActiveSubscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks every bridge that currently holds a feed subscription.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new subscription. The entry lives exactly as long as the
    /// returned lease.
    pub fn register(&self, document_id: Uuid) -> SubscriptionLease {
        let subscription_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.entries().insert(
            subscription_id,
            ActiveSubscription {
                subscription_id,
                document_id,
                opened_at: Utc::now(),
            },
        );

        SubscriptionLease {
            subscription_id,
            registry: self.inner.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.entries().len()
    }

    /// Open subscriptions ordered by id.
    pub fn active(&self) -> Vec<ActiveSubscription> {
        let mut active: Vec<_> = self.inner.entries().values().cloned().collect();
        active.sort_by_key(|entry| entry.subscription_id);
        active
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("active", &self.active_count())
            .finish()
    }
}

/// Registration handle; dropping it removes the registry entry.
#[derive(Debug)]
pub struct SubscriptionLease {
    subscription_id: u64,
    registry: Arc<RegistryInner>,
}

impl SubscriptionLease {
    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }
}

impl Drop for SubscriptionLease {
    fn drop(&mut self) {
        self.registry.entries().remove(&self.subscription_id);
    }
}

impl fmt::Debug for RegistryInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryInner").finish_non_exhaustive()
    }
}
