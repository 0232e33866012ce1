/*
 * Responsibility
 * - App-wide error type and its HTTP mapping (status + JSON body)
 * - DPoP rejections keep their reason code so clients can tell them apart
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dpop_bind::RejectReason;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    Unauthorized { code: &'static str, message: String },
    #[error("{code}: {message}")]
    Forbidden { code: &'static str, message: String },
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized { code, message } => (StatusCode::UNAUTHORIZED, code, message),
            AppError::Forbidden { code, message } => (StatusCode::FORBIDDEN, code, message),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
                "internal server error".into(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<RejectReason> for AppError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            // Our own backend failed, not the client.
            RejectReason::ReplayStoreUnavailable => AppError::Internal,
            other => AppError::forbidden(other.code(), format!("Invalid DPoP: {}", other)),
        }
    }
}
