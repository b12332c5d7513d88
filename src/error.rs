//! Application error types for membership-sync
//!
//! This module defines the error taxonomy used by each layer of the sync engine.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Errors raised by the source API client
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// Token exchange failed or a request was rejected twice with 401
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Still rate limited after all retries
    #[error("Rate limited after {retries} retries")]
    RateLimited {
        /// Number of retries performed before giving up
        retries: u32,
    },

    /// Non-2xx response from the API
    #[error("API error: HTTP {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response excerpt or description
        message: String,
        /// Whether the failure was transient (5xx after retries were exhausted)
        transient: bool,
    },

    /// Client-side deadline exceeded after all retries
    #[error("Request timed out after {retries} retries")]
    Timeout {
        /// Number of retries performed before giving up
        retries: u32,
    },

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The server reported the async query as failed
    #[error("Async query failed: {0}")]
    AsyncQueryFailed(String),

    /// The async query never reached a terminal state
    #[error("Async query did not complete after {attempts} polls")]
    AsyncQueryTimeout {
        /// Number of status polls performed
        attempts: u32,
    },

    /// The response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Stable error code used in reports
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthFailed(_) => "AUTH_FAILED",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Api { .. } => "API_ERROR",
            ApiError::Timeout { .. } => "TIMEOUT",
            ApiError::Network(_) => "NETWORK_ERROR",
            ApiError::AsyncQueryFailed(_) => "ASYNC_QUERY_FAILED",
            ApiError::AsyncQueryTimeout { .. } => "ASYNC_QUERY_TIMEOUT",
            ApiError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Returns true for 5xx failures that exhausted their retries
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Api { transient, .. } => *transient,
            ApiError::Timeout { .. } | ApiError::Network(_) => true,
            _ => false,
        }
    }
}

/// Per-record validation errors produced by the transformer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A required field is absent or blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Email could not be normalized into a valid address
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// A date field could not be parsed
    #[error("Invalid date in {field}: {value}")]
    InvalidDate {
        /// Field name
        field: &'static str,
        /// Raw value received from the source
        value: String,
    },
}

impl TransformError {
    /// Stable error code used in reports
    pub fn code(&self) -> &'static str {
        match self {
            TransformError::MissingField(_) => "MISSING_FIELD",
            TransformError::InvalidEmail(_) => "INVALID_EMAIL",
            TransformError::InvalidDate { .. } => "INVALID_DATE",
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Background connection error
    #[error("Database connection error: {0}")]
    Connection(tokio_rusqlite::Error),

    /// Record not found
    #[error("Record not found")]
    NotFound,

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::ConstraintViolation(message.unwrap_or_else(|| code.to_string()))
            }
            other => DbError::Sqlite(other),
        }
    }
}

impl From<tokio_rusqlite::Error> for DbError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(inner) => inner.into(),
            other => DbError::Connection(other),
        }
    }
}

impl DbError {
    /// Stable error code used in reports
    pub fn code(&self) -> &'static str {
        match self {
            DbError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            DbError::NotFound => "NOT_FOUND",
            _ => "DATABASE_ERROR",
        }
    }
}

/// Errors that abort a sync invocation
#[derive(Debug, Error)]
pub enum SyncError {
    /// Preflight checks did not pass; nothing was written
    #[error("Preflight failed: {0}")]
    Preflight(String),

    /// Source API error
    #[error("Source API error: {0}")]
    Api(#[from] ApiError),

    /// Local store error
    #[error("Local store error: {0}")]
    Database(#[from] DbError),
}

impl SyncError {
    /// Stable error code used in reports
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Preflight(_) => "PREFLIGHT_FAILED",
            SyncError::Api(e) => e.code(),
            SyncError::Database(e) => e.code(),
        }
    }
}

/// Report serialization errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// IO error while writing or reading a report
    #[error("Report IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Aggregated invariant failure raised by `assert_no_violations`
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{count} invariant violation(s): {summary}")]
pub struct InvariantError {
    /// Number of violations
    pub count: usize,
    /// Semicolon-separated `code at path` list
    pub summary: String,
}

/// Application-level error type
///
/// This is the main error type used by the binary.
/// It aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Report error
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Invariant violations
    #[error("Invariant check failed: {0}")]
    Invariant(#[from] InvariantError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
