use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ArtifactStore, MaintenanceGate};
use crate::error::{AppError, AppResult};
use crate::model::{Collection, CollectionStats, Dataset};
use crate::store::CollectionStore;

/// Replaces live collections with the contents of an artifact.
///
/// Stores that can swap all collections atomically are restored in one step.
/// Otherwise every collection is cleared and then repopulated in dependency
/// order; a failure during repopulation is reported as
/// [`AppError::PartialRestoreFailure`] because the store is then left with
/// some collections restored and the rest empty.
pub struct RestoreManager {
    store: Arc<dyn CollectionStore>,
    artifacts: ArtifactStore,
    gate: MaintenanceGate,
}

impl RestoreManager {
    pub fn new(store: Arc<dyn CollectionStore>, artifacts: ArtifactStore, gate: MaintenanceGate) -> Self {
        Self {
            store,
            artifacts,
            gate,
        }
    }

    pub async fn restore(&self, name: &str) -> AppResult<CollectionStats> {
        let artifact = self.artifacts.read(name).await?;
        validate_dataset(&artifact.data).map_err(|reason| AppError::corrupt(name, reason))?;

        let stats = artifact.data.stats();
        let _gate = self.gate.exclusive().await;

        info!(
            filename = %name,
            atomic = self.store.supports_atomic_replace(),
            customers = stats.customers,
            feedbacks = stats.feedbacks,
            responses = stats.responses,
            "restore started"
        );

        if self.store.supports_atomic_replace() {
            self.store.replace_all(artifact.data).await?;
        } else {
            self.clear_then_insert(name, artifact.data).await?;
        }

        info!(filename = %name, "restore completed");
        Ok(stats)
    }

    async fn clear_then_insert(&self, name: &str, data: Dataset) -> AppResult<()> {
        let mut cleared = Vec::new();
        for collection in Collection::ALL {
            if let Err(err) = self.store.clear(collection).await {
                if cleared.is_empty() {
                    return Err(err.into());
                }
                error!(filename = %name, %collection, error = %err, "restore aborted during clear phase");
                return Err(AppError::PartialRestoreFailure {
                    artifact: name.to_string(),
                    restored: Vec::new(),
                    failed: collection,
                    cause: err.to_string(),
                });
            }
            cleared.push(collection);
        }

        let mut restored = Vec::new();
        for batch in data.into_batches() {
            let collection = batch.collection();
            if !batch.is_empty()
                && let Err(err) = self.store.insert_batch(batch).await
            {
                warn!(
                    filename = %name,
                    %collection,
                    restored = ?restored,
                    error = %err,
                    "restore left the store partially populated"
                );
                return Err(AppError::PartialRestoreFailure {
                    artifact: name.to_string(),
                    restored,
                    failed: collection,
                    cause: err.to_string(),
                });
            }
            restored.push(collection);
        }

        Ok(())
    }
}

/// Checks the constraints the store enforces before anything is deleted.
fn validate_dataset(data: &Dataset) -> Result<(), String> {
    ensure_unique(
        data.customers.iter().map(|customer| customer.id),
        Collection::Customers,
    )?;
    ensure_unique(
        data.feedbacks.iter().map(|feedback| feedback.id),
        Collection::Feedbacks,
    )?;
    ensure_unique(
        data.responses.iter().map(|response| response.id),
        Collection::Responses,
    )?;

    let mut emails = HashSet::new();
    if let Some(customer) = data
        .customers
        .iter()
        .find(|customer| !emails.insert(customer.email.as_str()))
    {
        return Err(format!("duplicate customer email {}", customer.email));
    }

    let mut feedback_emails = HashSet::new();
    if let Some(feedback) = data
        .feedbacks
        .iter()
        .find(|feedback| !feedback_emails.insert(feedback.customer_email.as_str()))
    {
        return Err(format!(
            "more than one feedback for email {}",
            feedback.customer_email
        ));
    }

    Ok(())
}

fn ensure_unique(ids: impl Iterator<Item = Uuid>, collection: Collection) -> Result<(), String> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(format!("duplicate {collection} id {id}"));
        }
    }
    Ok(())
}
