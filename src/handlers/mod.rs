//! HTTP handlers, grouped by resource.

pub mod backups;
pub mod changestream;
pub mod records;

use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: &'static str,
}

impl MessageBody {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

pub async fn healthcheck() -> Json<&'static str> {
    Json("Working")
}

/// Path ids are validated before any store access.
pub(crate) fn parse_id(raw: &str, entity: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::validation(format!("invalid {entity} id: {raw}")))
}
