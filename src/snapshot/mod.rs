//! Point-in-time backups of all record collections.

pub mod artifact;
pub mod restore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::error::AppResult;
use crate::model::CollectionStats;
use crate::store::CollectionStore;

pub use artifact::{ArtifactName, ArtifactStore, BackupArtifact};
pub use restore::RestoreManager;

/// Serializes restores against snapshot creation.
///
/// Any number of snapshots may run together; a restore waits for them and
/// blocks new ones until it finishes.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceGate {
    lock: Arc<RwLock<()>>,
}

impl MaintenanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotCreated {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub stats: CollectionStats,
}

pub struct SnapshotManager {
    store: Arc<dyn CollectionStore>,
    artifacts: ArtifactStore,
    gate: MaintenanceGate,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn CollectionStore>, artifacts: ArtifactStore, gate: MaintenanceGate) -> Self {
        Self {
            store,
            artifacts,
            gate,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Exports every collection into a new artifact.
    ///
    /// Reads are not isolated from concurrent writers; the artifact reflects
    /// whatever the store returns for one whole-store read.
    pub async fn create(&self) -> AppResult<SnapshotCreated> {
        let _gate = self.gate.shared().await;

        let data = self.store.read_all().await?;
        let artifact = BackupArtifact {
            timestamp: Utc::now(),
            data,
        };
        let stats = artifact.data.stats();
        let name = self.artifacts.write(&artifact).await?;

        info!(
            filename = %name,
            customers = stats.customers,
            feedbacks = stats.feedbacks,
            responses = stats.responses,
            "backup created"
        );

        Ok(SnapshotCreated {
            filename: name.to_string(),
            timestamp: artifact.timestamp,
            stats,
        })
    }

    pub async fn list(&self) -> AppResult<Vec<String>> {
        Ok(self
            .artifacts
            .list()
            .await?
            .into_iter()
            .map(|name| name.to_string())
            .collect())
    }

    pub async fn read(&self, name: &str) -> AppResult<BackupArtifact> {
        self.artifacts.read(name).await
    }

    pub async fn delete(&self, name: &str) -> AppResult<()> {
        self.artifacts.delete(name).await?;
        info!(filename = %name, "backup deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::model::FeedbackRecord;
    use crate::store::{MemoryStore, RecordStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_then_read_returns_the_exported_records() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let feedback = store
            .insert_feedback(FeedbackRecord::new("a@x.com", "good", 5))
            .await
            .unwrap();

        let manager = SnapshotManager::new(
            store.clone(),
            ArtifactStore::new(dir.path()),
            MaintenanceGate::new(),
        );

        let created = manager.create().await.unwrap();
        assert_eq!(created.stats.feedbacks, 1);
        assert_eq!(manager.list().await.unwrap(), vec![created.filename.clone()]);

        let artifact = manager.read(&created.filename).await.unwrap();
        assert_eq!(artifact.data.feedbacks, vec![feedback]);
        assert_eq!(artifact.timestamp, created.timestamp);
    }

    #[tokio::test]
    async fn unlisted_name_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(
            Arc::new(MemoryStore::new()),
            ArtifactStore::new(dir.path()),
            MaintenanceGate::new(),
        );
        manager.create().await.unwrap();

        assert!(matches!(
            manager.read("backup-1-deadbeef.json").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unwritable_directory_reports_backup_failed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let manager = SnapshotManager::new(
            Arc::new(MemoryStore::new()),
            ArtifactStore::new(&blocker),
            MaintenanceGate::new(),
        );

        match manager.create().await {
            Err(AppError::Io { operation, .. }) => assert_eq!(operation, "Backup failed"),
            other => panic!("expected backup failure, got {other:?}"),
        }
    }
}
