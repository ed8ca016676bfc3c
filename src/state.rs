use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{DEFAULT_PASSWORD_HASH_COST, clamp_cost};
use crate::snapshot::{ArtifactStore, MaintenanceGate, RestoreManager, SnapshotManager};
use crate::store::{ChangeFeed, CollectionStore, RecordStore};
use crate::stream::{ChangeSubscriptionBridge, ConnectionRegistry, DEFAULT_STREAM_BUFFER};

/// Settings that shape the services built around a store.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub backup_dir: PathBuf,
    pub stream_buffer: usize,
    pub password_hash_cost: u32,
}

impl ServiceOptions {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
        }
    }

    pub fn password_hash_cost(mut self, cost: u32) -> Self {
        self.password_hash_cost = clamp_cost(cost);
        self
    }

    pub fn stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
    pub snapshots: Arc<SnapshotManager>,
    pub restores: Arc<RestoreManager>,
    pub bridge: Arc<ChangeSubscriptionBridge>,
    pub password_hash_cost: u32,
}

impl AppState {
    /// Wires every service to one shared store handle.
    pub fn new<S>(store: Arc<S>, options: ServiceOptions) -> Self
    where
        S: RecordStore + CollectionStore + ChangeFeed + 'static,
    {
        let gate = MaintenanceGate::new();
        let artifacts = ArtifactStore::new(options.backup_dir);

        Self {
            records: store.clone(),
            snapshots: Arc::new(SnapshotManager::new(
                store.clone(),
                artifacts.clone(),
                gate.clone(),
            )),
            restores: Arc::new(RestoreManager::new(store.clone(), artifacts, gate)),
            bridge: Arc::new(ChangeSubscriptionBridge::new(
                store,
                ConnectionRegistry::new(),
                options.stream_buffer,
            )),
            password_hash_cost: options.password_hash_cost,
        }
    }
}
