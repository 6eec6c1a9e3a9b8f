//! Backend-specific error types and conversions.

use aop_core::error::AopError;
use reqwest::StatusCode;
use serde::Deserialize;

/// Backend-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
}

/// Error body shapes returned by the auth and table APIs.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl BackendError {
    /// Build an API error from a non-success response body.
    pub(crate) fn from_body(status: StatusCode, body: &str) -> Self {
        let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = match parsed.code {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
        .or(parsed.error_code)
        .or(parsed.error.clone());
        let message = parsed
            .message
            .or(parsed.msg)
            .or(parsed.error_description)
            .or(parsed.error)
            .unwrap_or_else(|| body.trim().to_string());
        Self::Api {
            status,
            code,
            message,
        }
    }
}

impl From<BackendError> for AopError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Api {
                status,
                code,
                message,
            } => {
                // PostgREST reports "zero rows for a single-object request" as 406/PGRST116.
                if code.as_deref() == Some("PGRST116") || status == StatusCode::NOT_FOUND {
                    AopError::NotFound {
                        entity: "row".into(),
                        id: message,
                    }
                } else if status == StatusCode::UNAUTHORIZED
                    || status == StatusCode::FORBIDDEN
                    || matches!(
                        code.as_deref(),
                        Some(
                            "invalid_grant"
                                | "invalid_credentials"
                                | "refresh_token_not_found"
                                | "session_not_found"
                        )
                    )
                {
                    AopError::Unauthorized { reason: message }
                } else if status == StatusCode::CONFLICT
                    || code.as_deref() == Some("23505")
                    || code.as_deref() == Some("user_already_exists")
                    || message == "User already registered"
                {
                    AopError::Conflict { entity: message }
                } else if status == StatusCode::UNPROCESSABLE_ENTITY
                    || status == StatusCode::BAD_REQUEST
                {
                    AopError::Validation { message }
                } else {
                    AopError::Transport(format!("{status}: {message}"))
                }
            }
            BackendError::Config(msg) => AopError::Internal(msg),
            other => AopError::Transport(other.to_string()),
        }
    }
}
