//! Error types for the engine.

use serde::Serialize;
use std::fmt;
use tagsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// An external endpoint the engine depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    /// The relational store.
    Storage,
    /// The industrial protocol endpoint.
    Protocol,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Storage => f.write_str("storage"),
            Endpoint::Protocol => f.write_str("protocol endpoint"),
        }
    }
}

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied empty, missing or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No selection was stored, or it expired.
    #[error("no active selection; select the tags again")]
    NoActiveSelection,

    /// A required endpoint is not connected.
    #[error("no active connection to the {0}")]
    NotConnected(Endpoint),

    /// The protocol collaborator failed for a node.
    #[error("source error on {node_id}: {message}")]
    Source { node_id: String, message: String },

    /// The storage collaborator failed.
    #[error("storage error ({context}): {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },

    /// The replication request cannot be carried out.
    #[error("replication rejected: {0}")]
    Replication(String),

    /// One instance of a replication failed; the rest were not attempted.
    #[error("replication aborted at {table}: {source}")]
    ReplicaFailed {
        table: String,
        #[source]
        source: Box<EngineError>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A blocking or spawned task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Builds a [`EngineError::Source`] error.
    pub fn source_failure(node_id: impl Into<String>, message: impl fmt::Display) -> Self {
        EngineError::Source {
            node_id: node_id.into(),
            message: message.to_string(),
        }
    }

    /// Builds a [`EngineError::Storage`] error.
    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        EngineError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Classifies the error for the caller.
    pub fn status(&self) -> ErrorStatus {
        match self {
            EngineError::InvalidInput(_)
            | EngineError::NoActiveSelection
            | EngineError::Replication(_) => ErrorStatus::BadRequest,
            EngineError::NotConnected(_) => ErrorStatus::Unavailable,
            EngineError::ReplicaFailed { source, .. } => source.status(),
            EngineError::Source { .. }
            | EngineError::Storage { .. }
            | EngineError::Config(_)
            | EngineError::Task(_) => ErrorStatus::Internal,
        }
    }

    /// Serializable form handed to the transport layer.
    pub fn to_failure(&self) -> Failure {
        let status = self.status();
        Failure {
            status,
            code: status.http_code(),
            message: self.to_string(),
        }
    }
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    BadRequest,
    Unavailable,
    Internal,
}

impl ErrorStatus {
    pub fn http_code(self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Unavailable => 503,
            ErrorStatus::Internal => 500,
        }
    }
}

/// A structured failure with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub status: ErrorStatus,
    pub code: u16,
    pub message: String,
}

impl From<&EngineError> for Failure {
    fn from(err: &EngineError) -> Self {
        err.to_failure()
    }
}
