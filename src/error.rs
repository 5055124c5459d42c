//! Error types for the vault client.

use serde_json::Value;
use thiserror::Error;

use crate::validator::ValidationError;

/// Errors that can occur while building, sending or interpreting a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VaultError {
    /// The request, its arguments or its query did not match a declared schema.
    /// Raised before any network I/O.
    #[error("schema validation failed at '{}': {}", .0.location, .0.message)]
    Schema(#[from] ValidationError),

    #[error("no response")]
    NoResponse,

    #[error("HTTP request failed")]
    Transport(#[source] reqwest::Error),

    /// A well-formed response with a non-success status.
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("invalid command table")]
    CommandTable(#[source] CommandTableError),
}

/// Parse failure for a command table, by source format.
#[derive(Debug, Error)]
pub enum CommandTableError {
    #[error("invalid JSON command table")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML command table")]
    Yaml(#[from] serde_yaml::Error),

    /// A descriptor's `req` or `query` schema does not compile.
    #[error("command {name} declares an invalid schema")]
    Schema {
        name: String,
        #[source]
        source: ValidationError,
    },
}

impl VaultError {
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            reason: reason.into(),
        }
    }

    /// HTTP status for [`VaultError::Api`] failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<CommandTableError> for VaultError {
    fn from(err: CommandTableError) -> Self {
        Self::CommandTable(err)
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
