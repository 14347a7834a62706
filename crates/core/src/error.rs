//! Public error taxonomy
//!
//! `CoreError` is the single stable vocabulary every layer above the store
//! boundary translates into before a response leaves the process. Nothing
//! downstream (store driver messages, SDK exceptions) is allowed to leak
//! into `message` — it goes in the `tracing::error!` call instead.

use serde::Serialize;
use std::fmt;

/// Stable, externally-visible error classification.
///
/// HTTP status and retry-ability are derived from the kind, never
/// stored redundantly alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    NotFound,
    AlreadyExists,
    Locked,
    Terminal,
    Unavailable,
    MemoryExtractionFailed,
    RuntimeUnavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP status code this kind maps to when surfaced over the REST API.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 422,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::Locked => 409,
            ErrorKind::Terminal => 409,
            ErrorKind::Unavailable => 503,
            // Never sent as an HTTP response body on its own; carried in an
            // SSE `error` event or embedded in a single-mode envelope.
            ErrorKind::MemoryExtractionFailed => 200,
            ErrorKind::RuntimeUnavailable => 500,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether a client may retry this error after backing off.
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::Locked | ErrorKind::Unavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Locked => "LOCKED",
            ErrorKind::Terminal => "TERMINAL",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::MemoryExtractionFailed => "MEMORY_EXTRACTION_FAILED",
            ErrorKind::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            ErrorKind::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// The error type threaded through every core operation.
#[derive(Debug, thiserror::Error, Clone)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    /// ASCII `ERR_*` tag correlating this occurrence with its log line.
    pub error_id: String,
    pub details: Option<serde_json::Value>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_id: new_error_id(kind),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn locked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Locked, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Terminal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn memory_extraction_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MemoryExtractionFailed, message)
    }
}

/// Generates a correlatable `ERR_<KIND>_<random-suffix>` tag.
///
/// Not cryptographically significant — just unique enough per-process to
/// grep a log file for the matching line.
fn new_error_id(kind: ErrorKind) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ERR_{kind}_{n:08x}")
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_spec_table() {
        assert_eq!(ErrorKind::Validation.http_status(), 422);
        assert_eq!(ErrorKind::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorKind::Locked.http_status(), 409);
        assert_eq!(ErrorKind::Terminal.http_status(), 409);
        assert_eq!(ErrorKind::Unavailable.http_status(), 503);
        assert_eq!(ErrorKind::RuntimeUnavailable.http_status(), 500);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn retryable_kinds_are_locked_and_unavailable_only() {
        assert!(ErrorKind::Locked.retryable());
        assert!(ErrorKind::Unavailable.retryable());
        assert!(!ErrorKind::NotFound.retryable());
        assert!(!ErrorKind::Internal.retryable());
    }

    #[test]
    fn error_ids_are_unique_and_tagged() {
        let a = CoreError::not_found("x");
        let b = CoreError::not_found("x");
        assert_ne!(a.error_id, b.error_id);
        assert!(a.error_id.starts_with("ERR_NOT_FOUND_"));
    }
}
