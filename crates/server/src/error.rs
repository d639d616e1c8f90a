use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{db::cascade::CascadeError, services::access::AccessError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Caller identity required")]
    IdentityRequired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::IdentityRequired => AppError::IdentityRequired,
            AccessError::NotFound(_) => AppError::NotFound(err.to_string()),
            AccessError::Denied { .. } | AccessError::OwnerOnly { .. } => {
                AppError::Forbidden(err.to_string())
            }
        }
    }
}

impl From<CascadeError> for AppError {
    fn from(err: CascadeError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::IdentityRequired => (
                StatusCode::UNAUTHORIZED,
                "IDENTITY_REQUIRED",
                self.to_string(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid credentials".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::access::{Access, Entity};

    #[test]
    fn access_errors_map_to_distinct_statuses() {
        let status = |err: AccessError| AppError::from(err).into_response().status();

        assert_eq!(status(AccessError::IdentityRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AccessError::NotFound(Entity::Room)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(AccessError::Denied {
                entity: Entity::Product,
                required: Access::Edit,
            }),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let response = AppError::Internal("disk on fire".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
