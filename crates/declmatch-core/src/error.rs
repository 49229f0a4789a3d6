//! Error types and exit code mapping for a matching pass.
//!
//! Per-node failures are never errors: they are [`Diagnostic`](crate::Diagnostic)
//! values recorded on the node. The types here cover failures that stop a
//! whole pass before or around matching: the oracle refusing the synthetic
//! source, unreadable inputs, bad configuration.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Stable process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Bad input from the caller (unreadable file, malformed JSON, bad config).
    InvalidArguments = 2,
    /// The oracle could not compile the synthetic source or load its fixture.
    OracleFailure = 3,
    /// The pass completed but at least one decl node carries a diagnostic.
    Unmatched = 4,
    /// Bugs, unexpected state.
    InternalError = 10,
}

impl OutputErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Oracle Errors
// ============================================================================

/// Failures reported by an oracle implementation.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The synthetic probe source was rejected as a whole.
    #[error("synthetic source failed to compile: {message}")]
    CompileFailed { message: String },

    /// A fixture-backed oracle could not load its declarations.
    #[error("invalid fixture: {message}")]
    InvalidFixture { message: String },

    /// A type spelling could not be parsed.
    #[error("invalid type spelling '{spelling}': {message}")]
    InvalidSpelling { spelling: String, message: String },
}

// ============================================================================
// Pass Errors
// ============================================================================

/// Unified error type for a matching pass.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("invalid decl tree: {message}")]
    DeclTree { message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Result alias for pass-level operations.
pub type MatchResult<T> = Result<T, MatchError>;

impl From<&MatchError> for OutputErrorCode {
    fn from(err: &MatchError) -> Self {
        match err {
            MatchError::Oracle(_) => OutputErrorCode::OracleFailure,
            MatchError::Config { .. }
            | MatchError::DeclTree { .. }
            | MatchError::Io { .. }
            | MatchError::Json(_) => OutputErrorCode::InvalidArguments,
            MatchError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}
