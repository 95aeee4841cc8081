//! Error types shared across the workspace.

use thiserror::Error;

/// Errors produced while loading or solving a placement problem.
#[derive(Debug, Error)]
pub enum Error {
    /// The problem description is malformed or inconsistent.
    ///
    /// Raised for non-positive dimensions, duplicate module names, symmetry
    /// constraints referencing undefined modules, or a module claimed by
    /// more than one symmetry group. Fatal: the solver never starts.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Packing could not produce coordinates (e.g. the tree has no root).
    #[error("packing failed: {0}")]
    PackFailed(String),

    /// No placement was ever produced.
    #[error("no solution produced")]
    NoSolution,

    /// Underlying I/O failure while reading or writing problem files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("module b1 defined twice".to_string());
        assert_eq!(err.to_string(), "invalid input: module b1 defined twice");

        let err = Error::NoSolution;
        assert_eq!(err.to_string(), "no solution produced");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
