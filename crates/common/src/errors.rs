//! Error types for easyacme
//!
//! Every failure surfaced by the issuance core falls into one of a small set of
//! kinds. Callers branch on [`ErrorKind`] rather than on individual variants.

use std::fmt;
use thiserror::Error;

/// Main error type for easyacme operations
#[derive(Error, Debug)]
pub enum EasyAcmeError {
    /// Bad or unsupported input (key type, DNS provider type, missing domains)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown account, certificate or DNS provider
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Operation not allowed in the current state (double revoke)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Manual authorization session is missing or its TTL elapsed
    #[error("authorization session '{fingerprint}' expired or not found, create a new authorization")]
    AuthorizationExpired { fingerprint: String },

    /// TXT record not publicly resolvable before CA validation
    #[error("DNS precheck failed for {fqdn}: expected TXT value '{expected}', found {observed:?}")]
    Precheck {
        fqdn: String,
        expected: String,
        observed: Vec<String>,
    },

    /// CA or DNS provider API failure
    #[error("Upstream error: {operation} - {message}")]
    Upstream {
        operation: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Polling budget exhausted
    #[error("Timeout: {operation} after {elapsed_ms}ms (last status: {last_status})")]
    Timeout {
        operation: String,
        elapsed_ms: u64,
        last_status: String,
    },

    /// Polling aborted through a cancellation token
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Persistence failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Broken invariants that are not the caller's fault
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Dns,
    Upstream,
    Timeout,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Dns => "dns",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl EasyAcmeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } | Self::AuthorizationExpired { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Precheck { .. } => ErrorKind::Dns,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code a transport binding should use for this error
    pub fn to_http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Dns => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Upstream => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Cancelled => 499,
            ErrorKind::Internal => 500,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an upstream error without a source
    pub fn upstream(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an upstream error keeping the underlying cause
    pub fn upstream_with_source<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Upstream {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(
        operation: impl Into<String>,
        elapsed_ms: u64,
        last_status: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
            last_status: last_status.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

/// Result type alias for easyacme operations
pub type EasyAcmeResult<T> = Result<T, EasyAcmeError>;
