//! API error taxonomy and its HTTP mapping.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{CartError, TransitionError, UnknownPreference};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn internal(context: &'static str, source: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            context,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => ApiError::NotFound("record not found".to_string()),
            other => ApiError::internal("database error", other),
        }
    }
}

impl From<bb8::RunError<diesel_async::pooled_connection::PoolError>> for ApiError {
    fn from(e: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> Self {
        ApiError::internal("database pool error", e)
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        if e.is_forbidden() {
            ApiError::Forbidden(e.to_string())
        } else {
            ApiError::Validation(e.to_string())
        }
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<UnknownPreference> for ApiError {
    fn from(e: UnknownPreference) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Validation(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::Validation(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Internal { context, source } = &self {
            tracing::error!(error = %source, "{}", context);
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderStatus, Role};

    #[test]
    fn test_transition_errors_split_into_forbidden_and_validation() {
        let forbidden: ApiError = TransitionError::NotOwner.into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let invalid: ApiError = TransitionError::InvalidStatusForRole {
            role: Role::Customer,
            status: OrderStatus::Preparing,
        }
        .into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.to_string(), "invalid status Preparing for role customer");

        let driver_id: ApiError = TransitionError::DriverIdNotAllowed(Role::Restaurant).into();
        assert_eq!(driver_id.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_diesel_not_found_maps_to_404() {
        let err: ApiError = diesel::result::Error::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = diesel::result::Error::RollbackTransaction.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_status() {
        let err = ApiError::Conflict("pending confirmation".to_string());
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
