//! Error types for the persistence layer.
//!
//! Errors are grouped by category (resource state, search input, mapping
//! definitions, migrations and the backing engine) and all roll up into
//! [`StorageError`]. Callers that need the coarse API taxonomy use
//! [`StorageError::code`].

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::index::DocumentKind;
use crate::migration::MigrationStep;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Invalid search input (filters, page tokens, identifiers)
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Mapping definition errors
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Index migration errors
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Coarse error classification surfaced to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The addressed document does not exist.
    NotFound,
    /// A document with the caller-assigned name already exists.
    AlreadyExists,
    /// The request carried an invalid filter, token or identifier.
    InvalidArgument,
    /// Everything else.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::AlreadyExists => write!(f, "ALREADY_EXISTS"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl StorageError {
    /// Returns the API-level classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::Resource(ResourceError::NotFound { .. })
            | StorageError::Resource(ResourceError::NothingDeleted { .. }) => ErrorCode::NotFound,
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => {
                ErrorCode::AlreadyExists
            }
            StorageError::Search(_) => ErrorCode::InvalidArgument,
            StorageError::Mapping(_) | StorageError::Migration(_) | StorageError::Backend(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

/// Errors related to document state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested document was not found.
    #[error("{kind} not found: {name}")]
    NotFound { kind: DocumentKind, name: String },

    /// A document with the given name already exists.
    #[error("{kind} with name {name} already exists")]
    AlreadyExists { kind: DocumentKind, name: String },

    /// A delete-by-query matched nothing.
    #[error("no documents deleted from {index}")]
    NothingDeleted { index: String },
}

/// Errors related to caller-supplied search input.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The filter expression could not be compiled.
    #[error("invalid filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    /// The page token could not be decoded.
    #[error("invalid page token: {token}")]
    InvalidPageToken { token: String },

    /// Applying the field mask produced a document that cannot be stored.
    #[error("invalid update mask '{paths}': {message}")]
    InvalidFieldMask { paths: String, message: String },

    /// The identifier cannot be used to build an index name.
    #[error("invalid {what} '{value}': {message}")]
    InvalidIdentifier {
        what: &'static str,
        value: String,
        message: String,
    },
}

/// Errors raised while loading mapping definitions.
#[derive(Error, Debug)]
pub enum MappingError {
    /// The mapping directory or a file in it could not be read.
    #[error("failed to read mapping source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mapping file did not contain a valid versioned mapping.
    #[error("invalid mapping file {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A mapping file's base name is not a known document kind.
    #[error("unrecognized document kind mapping: {name}")]
    UnrecognizedKind { name: String },

    /// No mapping was provided for a document kind.
    #[error("no mapping found for document kind {kind}")]
    MissingKind { kind: DocumentKind },
}

/// Errors raised by the index migrator.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The engine did not acknowledge the write block on every shard.
    #[error("unable to block writes for index: {index}")]
    WriteBlockNotAcknowledged { index: String },

    /// The reindex task did not finish within the polling budget.
    #[error("reindex of {index} (task {task_id}) did not complete after {attempts} polls")]
    ReindexIncomplete {
        index: String,
        task_id: String,
        attempts: u32,
    },

    /// A migration step failed.
    #[error("migration of {index} failed at step '{step}': {source}")]
    StepFailed {
        index: String,
        step: MigrationStep,
        #[source]
        source: Box<StorageError>,
    },
}

/// Errors originating from the backing engine.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// The request could not be sent or its body could not be read.
    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    /// The engine answered with a non-success status.
    #[error("unexpected response from engine during {operation} (status {status}): {body}")]
    UnexpectedResponse {
        operation: String,
        status: u16,
        body: String,
    },

    /// One item of a bulk request was rejected.
    #[error("bulk item {position} failed (status {status}): {error_type}: {reason}")]
    BulkItem {
        position: usize,
        status: u16,
        error_type: String,
        reason: String,
    },

    /// The engine answered with a body of an unexpected shape.
    #[error("failed to decode {operation} response: {message}")]
    Decode { operation: String, message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_display() {
        let err = StorageError::Resource(ResourceError::NotFound {
            kind: DocumentKind::Note,
            name: "projects/p1/notes/n1".to_string(),
        });
        assert_eq!(err.to_string(), "note not found: projects/p1/notes/n1");
    }

    #[test]
    fn test_error_codes() {
        let not_found: StorageError = ResourceError::NothingDeleted {
            index: "grafeas-p1-occurrences".to_string(),
        }
        .into();
        assert_eq!(not_found.code(), ErrorCode::NotFound);
        assert!(not_found.is_not_found());

        let exists: StorageError = ResourceError::AlreadyExists {
            kind: DocumentKind::Project,
            name: "projects/p1".to_string(),
        }
        .into();
        assert_eq!(exists.code(), ErrorCode::AlreadyExists);

        let invalid: StorageError = SearchError::InvalidFilter {
            filter: "a ==".to_string(),
            message: "unexpected end of input".to_string(),
        }
        .into();
        assert_eq!(invalid.code(), ErrorCode::InvalidArgument);

        let internal: StorageError = BackendError::UnexpectedResponse {
            operation: "search".to_string(),
            status: 500,
            body: "{}".to_string(),
        }
        .into();
        assert_eq!(internal.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_serde_error_converts_to_serialization_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let storage_err: StorageError = err.into();
        assert!(matches!(
            storage_err,
            StorageError::Backend(BackendError::SerializationError { .. })
        ));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::NotFound.to_string(), "NOT_FOUND");
        assert_eq!(ErrorCode::InvalidArgument.to_string(), "INVALID_ARGUMENT");
    }
}
