use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::MessageBody;
use crate::{
    error::AppResult,
    model::{CollectionStats, Dataset},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct BackupCreated {
    pub message: &'static str,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct BackupContents {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub stats: CollectionStats,
    pub data: Dataset,
}

#[derive(Debug, Serialize)]
pub struct RestoreCompleted {
    pub message: &'static str,
    pub stats: CollectionStats,
}

pub async fn create_backup(State(state): State<AppState>) -> AppResult<Json<BackupCreated>> {
    let created = state.snapshots.create().await?;
    Ok(Json(BackupCreated {
        message: "Backup created successfully",
        filename: created.filename,
    }))
}

pub async fn list_backups(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.snapshots.list().await?))
}

pub async fn read_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<BackupContents>> {
    let artifact = state.snapshots.read(&filename).await?;
    Ok(Json(BackupContents {
        message: "Backup contents retrieved successfully",
        timestamp: artifact.timestamp,
        stats: artifact.data.stats(),
        data: artifact.data,
    }))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<MessageBody>> {
    state.snapshots.delete(&filename).await?;
    Ok(Json(MessageBody::new("Backup deleted successfully")))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Json<RestoreCompleted>> {
    let stats = state.restores.restore(&filename).await?;
    Ok(Json(RestoreCompleted {
        message: "Restore completed successfully",
        stats,
    }))
}
