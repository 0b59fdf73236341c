//! Error types for companyinfo.
//!
//! Library crates use [`CompanyInfoError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Remote failures carry their retry class in the variant itself, so the
//! resilience layer branches on [`FailureKind`] instead of inspecting messages.

use std::path::PathBuf;

/// Top-level error type for all companyinfo operations.
#[derive(Debug, thiserror::Error)]
pub enum CompanyInfoError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A remote request or page load exceeded its time budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A transient remote failure (connection reset, 5xx, broken body).
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote side signalled overload or rate limiting (HTTP 429/503).
    #[error("remote overloaded: {0}")]
    Overloaded(String),

    /// Non-retryable network/HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Classification service error (bad request, malformed reply, auth).
    #[error("classification error: {0}")]
    Classification(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV reading or writing error.
    #[error("table error: {0}")]
    Table(String),

    /// Data validation error (missing column, duplicate identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CompanyInfoError>;

/// Retry class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timed out; retried with a linear delay.
    Timeout,
    /// Transient load/page error; retried with a linear delay.
    Transient,
    /// Rate limit or overload signal; retried with exponential delay.
    Overloaded,
    /// Anything else; never retried.
    Terminal,
}

impl FailureKind {
    /// Whether a failure of this kind may succeed on another attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Terminal)
    }
}

impl CompanyInfoError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for the retry loop.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Transient(_) => FailureKind::Transient,
            Self::Overloaded(_) => FailureKind::Overloaded,
            _ => FailureKind::Terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CompanyInfoError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CompanyInfoError::validation("duplicate identifier 2330");
        assert!(err.to_string().contains("2330"));
    }

    #[test]
    fn failure_kinds() {
        assert_eq!(
            CompanyInfoError::Timeout("x".into()).failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            CompanyInfoError::Overloaded("503".into()).failure_kind(),
            FailureKind::Overloaded
        );
        assert_eq!(
            CompanyInfoError::Network("HTTP 404".into()).failure_kind(),
            FailureKind::Terminal
        );
        assert_eq!(
            CompanyInfoError::parse("no table").failure_kind(),
            FailureKind::Terminal
        );
    }

    #[test]
    fn only_terminal_is_not_retryable() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::Overloaded.is_retryable());
        assert!(!FailureKind::Terminal.is_retryable());
    }
}
