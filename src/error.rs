//! Error types for joinplan.

use std::fmt;

use thiserror::Error;

use crate::dialect::Technique;

/// Error returned by a predicate hook or an executor.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for planning operations.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The active dialect has no rendering for this pagination technique.
    #[error("{technique} pagination is not supported on the {dialect} dialect")]
    UnsupportedPagination {
        dialect: String,
        technique: Technique,
    },

    /// A cursor could not be decoded or does not match the sort key.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// A `where` or join hook failed; the whole build is abandoned.
    #[error("Predicate hook failed on '{alias}': {source}")]
    PredicateFailure {
        alias: String,
        #[source]
        source: BoxError,
    },

    /// Pagination arguments are structurally unusable.
    #[error("Invalid pagination arguments: {0}")]
    InvalidArguments(String),

    /// The plan tree is malformed.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// The external execution function failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`PlanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedPagination,
    InvalidCursor,
    PredicateFailure,
    InvalidArguments,
    InvalidPlan,
    Execution,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedPagination => "UnsupportedPagination",
            ErrorKind::InvalidCursor => "InvalidCursor",
            ErrorKind::PredicateFailure => "PredicateFailure",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::InvalidPlan => "InvalidPlan",
            ErrorKind::Execution => "Execution",
            ErrorKind::Config => "Config",
            ErrorKind::Io => "Io",
        };
        f.write_str(name)
    }
}

impl PlanError {
    /// Create an unsupported-pagination error for a dialect.
    pub fn unsupported(dialect: impl Into<String>, technique: Technique) -> Self {
        Self::UnsupportedPagination {
            dialect: dialect.into(),
            technique,
        }
    }

    /// Wrap a hook failure for the node with the given alias.
    pub fn predicate(alias: impl Into<String>, source: BoxError) -> Self {
        Self::PredicateFailure {
            alias: alias.into(),
            source,
        }
    }

    /// Create an invalid cursor error.
    pub fn cursor(message: impl Into<String>) -> Self {
        Self::InvalidCursor(message.into())
    }

    /// Create an invalid plan error.
    pub fn plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan(message.into())
    }

    /// The kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanError::UnsupportedPagination { .. } => ErrorKind::UnsupportedPagination,
            PlanError::InvalidCursor(_) => ErrorKind::InvalidCursor,
            PlanError::PredicateFailure { .. } => ErrorKind::PredicateFailure,
            PlanError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            PlanError::InvalidPlan(_) => ErrorKind::InvalidPlan,
            PlanError::Execution(_) => ErrorKind::Execution,
            PlanError::Config(_) => ErrorKind::Config,
            PlanError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;
