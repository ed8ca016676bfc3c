use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::model::Collection;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("backup '{name}' is corrupt: {reason}")]
    ArtifactCorrupt { name: String, reason: String },

    /// Live collections were cleared but not all of them were repopulated.
    #[error("restore from '{artifact}' failed while inserting {failed}: {cause}")]
    PartialRestoreFailure {
        artifact: String,
        restored: Vec<Collection>,
        failed: Collection,
        cause: String,
    },

    #[error("change stream error: {0}")]
    Stream(String),

    #[error("{operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn corrupt(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArtifactCorrupt {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ArtifactCorrupt { .. }
            | Self::PartialRestoreFailure { .. }
            | Self::Stream(_)
            | Self::Io { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ArtifactCorrupt { .. } => "artifact_corrupt",
            Self::PartialRestoreFailure { .. } => "partial_restore",
            Self::Stream(_) => "stream_error",
            Self::Io { .. } => "io_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            Self::Validation(msg) | Self::NotFound(msg) | Self::Conflict(msg) => (msg.clone(), None),
            Self::StoreUnavailable(cause) => ("Record store unavailable".to_string(), Some(cause.clone())),
            Self::ArtifactCorrupt { name, reason } => (
                format!("Backup '{name}' could not be parsed"),
                Some(reason.clone()),
            ),
            Self::PartialRestoreFailure {
                restored,
                failed,
                cause,
                ..
            } => {
                let restored = restored
                    .iter()
                    .map(|collection| collection.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    "Restore partially failed; the store holds mixed state".to_string(),
                    Some(format!(
                        "restored: [{restored}]; failed on {failed}: {cause}"
                    )),
                )
            }
            Self::Stream(cause) => ("Failed to establish change stream".to_string(), Some(cause.clone())),
            Self::Io { operation, source } => (operation.to_string(), Some(source.to_string())),
            Self::Internal(cause) => ("Internal server error".to_string(), Some(cause.clone())),
        };

        ErrorBody {
            error,
            code: self.code(),
            details,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                Self::NotFound(format!("{} not found: {id}", singular(collection)))
            }
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::Unsupported(operation) => {
                Self::Internal(format!("store does not support {operation}"))
            }
            StoreError::Rejected(message) => Self::Internal(message),
        }
    }
}

fn singular(collection: Collection) -> &'static str {
    match collection {
        Collection::Customers => "Customer",
        Collection::Feedbacks => "Feedback",
        Collection::Responses => "Response",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let id = Uuid::new_v4();
        let not_found = AppError::from(StoreError::not_found(Collection::Feedbacks, id));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), format!("Feedback not found: {id}"));

        let conflict = AppError::from(StoreError::Conflict("dup".to_string()));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let down = AppError::from(StoreError::Unavailable("gone".to_string()));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn partial_restore_is_reported_distinctly() {
        let err = AppError::PartialRestoreFailure {
            artifact: "backup-1.json".to_string(),
            restored: vec![Collection::Customers, Collection::Feedbacks],
            failed: Collection::Responses,
            cause: "boom".to_string(),
        };

        assert_eq!(err.code(), "partial_restore");
        let body = err.body();
        assert_eq!(
            body.details.as_deref(),
            Some("restored: [customers, feedbacks]; failed on responses: boom")
        );
    }

    #[test]
    fn io_errors_keep_operation_headline() {
        let err = AppError::io(
            "Backup failed",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        );
        let body = err.body();
        assert_eq!(body.error, "Backup failed");
        assert_eq!(body.details.as_deref(), Some("read-only"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
