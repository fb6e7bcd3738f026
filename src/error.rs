use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Upstream answered with a non-2xx status. Carries an already-normalized
    /// message parsed from the upstream error body.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    /// The upstream could not be reached at all; no status or body exists.
    #[error("Transport error: {0}")]
    Transport(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(anyhow::Error::new(err))
    }
}

impl AppError {
    /// Registration conflict gets a fixed client-facing message.
    pub fn user_already_exists() -> Self {
        AppError::Upstream {
            status: StatusCode::CONFLICT,
            message: "User already exists".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, error_message) = match self {
            AppError::Config(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal configuration error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Upstream { status, message } => (status, message),
            AppError::Transport(err) => {
                tracing::error!(error = %err, "Upstream transport failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Upstream service unreachable".to_string(),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
            }),
        )
            .into_response()
    }
}
