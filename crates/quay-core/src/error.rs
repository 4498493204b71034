//! Error types and result aliases for quay.
//!
//! The facade discriminates exactly four store error classes when mapping to
//! HTTP responses; everything else is surfaced as an internal error.

use std::fmt;

/// The result type used throughout quay.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the cluster-state store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource was not found.
    #[error("not found: {resource_type} with id {id}")]
    ResourceNotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A resource with the same identifier already exists.
    #[error("already exists: {resource_type} with id {id}")]
    ResourceExists {
        /// The type of resource that collided.
        resource_type: &'static str,
        /// The identifier that collided.
        id: String,
    },

    /// A concurrent writer won; the caller's view of the resource is stale.
    #[error("resource conflict: {message}")]
    ResourceConflict {
        /// Description of the conflict.
        message: String,
    },

    /// The requested lifecycle transition is not legal from the current state.
    #[error("invalid state transition: {message}")]
    InvalidStateTransition {
        /// Description of the rejected transition.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new resource not found error.
    #[must_use]
    pub fn resource_not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::ResourceNotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a new resource exists error.
    #[must_use]
    pub fn resource_exists(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::ResourceExists {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a new resource conflict error.
    #[must_use]
    pub fn resource_conflict(message: impl Into<String>) -> Self {
        Self::ResourceConflict {
            message: message.into(),
        }
    }

    /// Creates a new invalid state transition error.
    #[must_use]
    pub fn invalid_state_transition(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_names_resource_and_id() {
        let err = Error::resource_not_found("task", "t-1");
        assert_eq!(err.to_string(), "not found: task with id t-1");
    }

    #[test]
    fn test_conflict_display_carries_message() {
        let err = Error::resource_conflict("tag is stale");
        assert_eq!(err.to_string(), "resource conflict: tag is stale");
    }
}
