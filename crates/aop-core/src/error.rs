//! Error types shared by every AOP crate.

use thiserror::Error;

/// Outcome of a failed backend or domain operation.
///
/// "No authenticated identity" is not an error; providers report it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum AopError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Conflict: {entity} already exists")]
    Conflict { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AopError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type AopResult<T> = Result<T, AopError>;
