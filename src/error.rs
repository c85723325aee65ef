//! HTTP-facing error type shared by the control surface and the relay.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::{RegistrationError, StoreError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(_) => Self::BadRequest(err.to_string()),
            StoreError::Serialization(_) => Self::Internal(err.to_string()),
            _ => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Invalid(_) => Self::Validation(err.to_string()),
            RegistrationError::Duplicate { .. } | RegistrationError::IdCollision(_) => {
                Self::Conflict(err.to_string())
            }
            RegistrationError::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_errors_map_to_statuses() {
        let duplicate: ApiError = RegistrationError::Duplicate {
            name: "Alice".into(),
            existing_id: "F30AL202403151042".into(),
        }
        .into();
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);

        let invalid: ApiError = RegistrationError::Invalid("age".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let down: ApiError =
            RegistrationError::Store(StoreError::Unavailable("refused".into())).into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
