//! Error taxonomy shared by the engine, the stores and the provider client.
//!
//! Four classes, matching how callers are expected to react:
//! - [`BridgeError::NotFound`]: a lookup miss (template, record). Expected;
//!   the creation flow treats a missing template as "not actionable".
//! - [`BridgeError::Provider`]: the remote Task Provider call failed.
//!   Carries the upstream HTTP status when one was received.
//! - [`BridgeError::Store`]: local persistence failed. When raised after a
//!   successful provider write, the engine has already attempted (and
//!   logged) its compensating action.
//! - [`BridgeError::Validation`]: malformed alert or template payload.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider request failed: {message}")]
    Provider {
        /// Upstream HTTP status, when the provider answered at all.
        status: Option<u16>,
        /// Raw upstream error payload or transport error text.
        message: String,
    },

    #[error("store operation failed: {message}")]
    Store { message: String },

    #[error("invalid payload: {0}")]
    Validation(String),
}

impl BridgeError {
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// True for the expected-miss class that event flows drop silently.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row".to_string()),
            other => Self::Store {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        // JSON columns live in the store; a decode failure is a store fault.
        Self::Store {
            message: format!("column decode: {err}"),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
