use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use thiserror::Error;

use crate::equipments::EquipmentErrors;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidEquipment(#[from] EquipmentErrors),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(DieselError),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("invalid upload `{filename}`: {reason}")]
    Upload { filename: String, reason: String },
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Validation(_) | StoreError::Upload { .. } => "validation_error",
            StoreError::InvalidEquipment(_) => "invalid_equipment",
            StoreError::Conflict(_) => "conflict",
            StoreError::Database(_)
            | StoreError::Pool(_)
            | StoreError::Storage(_)
            | StoreError::PasswordHash(_)
            | StoreError::Serialization(_) => "internal_error",
        }
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StoreError::NotFound("record".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info) => {
                StoreError::Validation(info.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort();
        StoreError::Validation(format!("invalid fields: {}", fields.join(", ")))
    }
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Validation(_)
            | StoreError::Upload { .. }
            | StoreError::InvalidEquipment(_) => StatusCode::BAD_REQUEST,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let mut body = json!({ "error": self.kind(), "message": message });
        if let StoreError::InvalidEquipment(errors) = self {
            body["lines"] = json!(errors.lines());
        }
        HttpResponse::build(status).json(body)
    }
}
