//! Eventstore error types.

use thiserror::Error;

use crate::event::{AggregateType, EventType};

/// Boxed source error produced by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of an [`EventstoreError`], used by callers to decide
/// how to react without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; retrying the same request cannot succeed.
    InvalidArgument,
    /// The stream or a unique constraint moved underneath the caller.
    PreconditionFailed,
    /// A required object does not exist.
    NotFound,
    /// Stored data could not be interpreted.
    Internal,
    /// No mapper is registered for an event type.
    Unimplemented,
    /// The storage backend failed.
    Unavailable,
}

/// Top-level eventstore error type.
#[derive(Debug, Error)]
pub enum EventstoreError {
    /// A query, registration or payload was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_type}/{aggregate_id}: expected sequence {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// Type of the conflicting aggregate.
        aggregate_type: AggregateType,
        /// Identifier of the conflicting aggregate.
        aggregate_id: String,
        /// The sequence the writer expected to be the latest.
        expected: u64,
        /// The latest sequence actually persisted.
        actual: u64,
    },

    /// A unique constraint would have been violated by the push.
    #[error("unique constraint {unique_type}/{unique_field} violated: {message}")]
    UniqueConstraintViolation {
        /// Namespace of the constraint.
        unique_type: String,
        /// The value that must be unique within the namespace.
        unique_field: String,
        /// Error message declared together with the constraint.
        message: String,
    },

    /// An object required by the caller does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A filter mapper could not turn a stored payload into its typed event.
    #[error("unable to map event {event_type}: {message}")]
    Unmarshal {
        /// The event type whose payload failed to decode.
        event_type: EventType,
        /// Decoder error message.
        message: String,
    },

    /// No mapper is registered for the event type.
    #[error("no event mapper registered for {0}")]
    Unimplemented(EventType),

    /// Folding events into a model failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(#[source] BoxError),
}

impl EventstoreError {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ConcurrencyConflict { .. } | Self::UniqueConstraintViolation { .. } => {
                ErrorKind::PreconditionFailed
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unmarshal { .. } | Self::Internal(_) => ErrorKind::Internal,
            Self::Unimplemented(_) => ErrorKind::Unimplemented,
            Self::Infrastructure(_) => ErrorKind::Unavailable,
        }
    }

    /// Returns `true` if reloading state and recomputing the change may
    /// succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::PreconditionFailed
    }
}
