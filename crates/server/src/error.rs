//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Responses carry a JSON body
//! `{"message": "..."}`; server errors are captured to Sentry and answered
//! with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::middleware::GateRejection;
use crate::services::auth::AuthError;
use crate::services::intake::IntakeError;

/// Message sent for every 5xx response.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Intake workflow operation failed.
    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Access gate refused the request.
    #[error("Gate error: {0}")]
    Gate(#[from] GateRejection),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Intake(err) => match err {
                IntakeError::Validation(_) | IntakeError::Conflict(_) => StatusCode::BAD_REQUEST,
                IntakeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidEmail(_)
                | AuthError::InvalidRole(_)
                | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::Token(_) | AuthError::Store(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Gate(GateRejection::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            Self::Gate(GateRejection::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server error details are never exposed.
    #[must_use]
    pub fn message(&self) -> String {
        if self.status().is_server_error() {
            return INTERNAL_ERROR_MESSAGE.to_owned();
        }

        match self {
            Self::Intake(err) => err.to_string(),
            Self::Auth(err) => err.to_string(),
            Self::Gate(rejection) => rejection.to_string(),
            Self::BadRequest(msg) | Self::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::services::intake::ConflictKind;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(IntakeError::Validation("bad city".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(IntakeError::Conflict(ConflictKind::AlreadyClosed).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(IntakeError::Storage(StoreError::DataCorruption("x".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(GateRejection::Unauthenticated("missing token").into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(GateRejection::Forbidden("access denied").into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_error_details_hidden() {
        let err = AppError::from(IntakeError::Storage(StoreError::DataCorruption(
            "invalid city in database".into(),
        )));
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);

        let err = AppError::Internal("secret detail".into());
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_conflict_messages() {
        let err = AppError::from(IntakeError::Conflict(ConflictKind::AlreadyOpen));
        assert_eq!(err.message(), "reception already in progress");
    }
}
