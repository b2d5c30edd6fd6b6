// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for caller evaluation operations
//!
//! Only validation, not-found and conflict errors are surfaced to callers,
//! each with a stable machine-readable code. Everything else is absorbed
//! inside the engine: internal failures downgrade the recommendation instead
//! of failing the call, and the bias of every absorbed failure is toward
//! `analyze` or `block`, never toward letting a caller through.

use screening_store::StoreError;
use shared_types::PhoneParseError;
use thiserror::Error;

/// Result type alias for evaluation operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Comprehensive error types for the screening engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input, rejected before any lookup
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Explicit lookup by id found no record
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Concurrent write detected via version mismatch
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Classifier did not answer within its latency budget (absorbed)
    #[error("Classification timed out after {timeout_ms}ms")]
    ClassificationTimeout { timeout_ms: u64 },

    /// Cache backend unavailable (absorbed, degrades to repository reads)
    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    /// Invalid engine or scoring-model configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Repository operation failed
    #[error("Store error: {message}")]
    Store { message: String },

    /// I/O error (scoring model file operations)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Create a validation error
    pub fn validation<T: ToString>(message: T) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    /// Create a not-found error
    pub fn not_found<T: ToString>(message: T) -> Self {
        Self::NotFound {
            message: message.to_string(),
        }
    }

    /// Create a conflict error
    pub fn conflict<T: ToString>(message: T) -> Self {
        Self::Conflict {
            message: message.to_string(),
        }
    }

    /// Create a classification timeout error
    pub fn classification_timeout(timeout_ms: u64) -> Self {
        Self::ClassificationTimeout { timeout_ms }
    }

    /// Create a cache unavailable error
    pub fn cache_unavailable<T: ToString>(message: T) -> Self {
        Self::CacheUnavailable {
            message: message.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config<T: ToString>(message: T) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    /// Create a store error
    pub fn store<T: ToString>(message: T) -> Self {
        Self::Store {
            message: message.to_string(),
        }
    }

    /// Create an I/O error
    pub fn io<T: ToString>(message: T) -> Self {
        Self::Io {
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal<T: ToString>(message: T) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ClassificationTimeout { .. } => "classification_timeout",
            Self::CacheUnavailable { .. } => "cache_unavailable",
            Self::Configuration { .. } => "configuration_error",
            Self::Store { .. } => "store_error",
            Self::Io { .. } => "io_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether this error is surfaced to the calling layer
    ///
    /// Everything else is absorbed into a safe default recommendation so a
    /// single caller's call is never failed by an engine-internal problem.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::NotFound { .. } | Self::Conflict { .. }
        )
    }

    /// Whether this error is absorbed inside the engine
    pub fn is_internal(&self) -> bool {
        !self.is_surfaced()
    }

    /// Whether retrying the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::CacheUnavailable { .. } | Self::Store { .. }
        )
    }
}

impl From<PhoneParseError> for EngineError {
    fn from(err: PhoneParseError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { message } => Self::NotFound { message },
            StoreError::Conflict { message } => Self::Conflict { message },
            StoreError::Unavailable { message } | StoreError::Serialization { message } => {
                Self::Store { message }
            }
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}
