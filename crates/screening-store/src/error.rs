// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for repository operations

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Common errors surfaced by repository implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record looked up by id or key does not exist
    #[error("record not found: {message}")]
    NotFound { message: String },

    /// An upsert presented a stale version for an existing record
    #[error("version conflict: {message}")]
    Conflict { message: String },

    /// The backing store cannot be reached
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// A record could not be encoded or decoded
    #[error("serialization failed: {message}")]
    Serialization { message: String },
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found<T: ToString>(message: T) -> Self {
        Self::NotFound {
            message: message.to_string(),
        }
    }

    /// Create a version-conflict error
    pub fn conflict<T: ToString>(message: T) -> Self {
        Self::Conflict {
            message: message.to_string(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable<T: ToString>(message: T) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization<T: ToString>(message: T) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Whether retrying the operation may succeed
    ///
    /// Conflicts are retryable after re-reading the record; unavailability is
    /// retryable after backoff. Missing records and malformed data are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable { .. })
    }

    /// Whether this error is a missing-record condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error is a version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_helpers() {
        let err = StoreError::not_found("whitelist entry 42");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("whitelist entry 42"));

        let err = StoreError::conflict("expected version 3, found 5");
        assert!(err.is_conflict());
    }

    #[test]
    fn retryable_classification() {
        assert!(StoreError::conflict("stale").is_retryable());
        assert!(StoreError::unavailable("down").is_retryable());
        assert!(!StoreError::not_found("gone").is_retryable());
        assert!(!StoreError::serialization("bad json").is_retryable());
    }
}
