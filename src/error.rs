use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::session::SessionError;
use crate::store::StoreError;

pub const TOKEN_NOT_FOUND: &str = "Unauthorized request. Token not found.";
pub const TOKEN_INVALID: &str = "Unauthorized request. Token invalid.";
pub const USER_DOES_NOT_EXIST: &str = "Authentication failed. User does not exist.";
pub const WRONG_PASSWORD: &str = "Authentication failed. Wrong password.";
pub const NOT_THE_AUTHOR: &str = "User is not the author of the post.";
pub const INVALID_DATA_TYPE: &str = "Invalid data type.";
pub const EMAIL_TAKEN: &str = "Email already registered.";
const INTERNAL: &str = "Internal server error.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown identity or credential mismatch during login.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Missing, invalid or expired session token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not entitled. Reported as 400 for client compatibility.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::AuthFailed(_)
            | AppError::Forbidden(_)
            | AppError::NotFound(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UserNotFound => AppError::AuthFailed(USER_DOES_NOT_EXIST.into()),
            SessionError::WrongPassword => AppError::AuthFailed(WRONG_PASSWORD.into()),
            SessionError::TokenNotFound => AppError::Unauthorized(TOKEN_NOT_FOUND.into()),
            SessionError::TokenInvalid => AppError::Unauthorized(TOKEN_INVALID.into()),
            SessionError::EmailTaken => AppError::Validation(EMAIL_TAKEN.into()),
            SessionError::Hash(e) => AppError::Internal(format!("bcrypt: {}", e)),
            SessionError::Task(e) => AppError::Internal(format!("blocking task: {}", e)),
            SessionError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg)
            | AppError::AuthFailed(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg,
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                INTERNAL.to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                INTERNAL.to_string()
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn response_message(err: AppError) -> String {
        let body = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["message"].as_str().unwrap().to_string()
    }

    #[test]
    fn client_errors_return_400() {
        assert_eq!(
            response_status(AppError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(AppError::AuthFailed(WRONG_PASSWORD.into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(AppError::NotFound("gone".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn forbidden_is_reported_as_400() {
        assert_eq!(
            response_status(AppError::Forbidden(NOT_THE_AUTHOR.into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized(TOKEN_INVALID.into())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn store_and_internal_return_500() {
        assert_eq!(
            response_status(AppError::Store(StoreError::Task("boom".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn session_errors_map_to_taxonomy() {
        assert!(matches!(
            AppError::from(SessionError::TokenNotFound),
            AppError::Unauthorized(ref m) if m == TOKEN_NOT_FOUND
        ));
        assert!(matches!(
            AppError::from(SessionError::UserNotFound),
            AppError::AuthFailed(ref m) if m == USER_DOES_NOT_EXIST
        ));
        assert!(matches!(
            AppError::from(SessionError::EmailTaken),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn body_carries_the_message() {
        assert_eq!(
            response_message(AppError::Unauthorized(TOKEN_NOT_FOUND.into())).await,
            TOKEN_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        assert_eq!(
            response_message(AppError::Internal("secret detail".into())).await,
            INTERNAL
        );
    }
}
