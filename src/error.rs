//! Symbolic error kinds shared by every public entry point.

use std::fmt;

/// The category of failure, independent of the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inputs whose shapes contradict the tree, each other, or the matrix
    /// they describe.
    DimensionMismatch,
    /// Negative tolerances, empty ranges, `leafsize == 0`, NaN/Inf inputs.
    InvalidArgument,
    /// A known edge case that is deliberately left unhandled: a branch
    /// merge where exactly one child fully eliminated its block and the
    /// other did not.
    NotImplemented,
    /// A dense solve at the root reported (near-)singularity.
    NumericalFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::NumericalFailure => "numerical_failure",
        };
        write!(f, "{s}")
    }
}

/// An error raised by the HSS crate: a symbolic kind plus a message naming
/// the offending shape(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        if kind == ErrorKind::NumericalFailure {
            log::error!("numerical_failure: {message}");
        }
        Self { kind, message }
    }

    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DimensionMismatch, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub fn numerical_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NumericalFailure, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// Result alias used by every public entry point in this crate.
pub type Result<T> = std::result::Result<T, Error>;
