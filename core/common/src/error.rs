//! Common error types for fsabstract.

use thiserror::Error;

/// Top-level error type for file storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required driver option is missing or has an invalid value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No driver is registered under the requested name.
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// The backend could not be reached while initializing a driver.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No location for the driver, or the backend has no such object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Opaque failure from a backend's own transport.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A data operation was attempted before `initialize`.
    #[error("Driver not initialized: {0}")]
    NotInitialized(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Map an I/O error, keeping missing files distinguishable from other failures.
    pub fn from_io(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("{}: {}", context, err)),
            _ => Error::Backend(format!("{}: {}", context, err)),
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Only transport-level failures qualify; configuration and lookup
    /// errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Backend(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_io_not_found() {
        let err = Error::from_io(io::Error::new(io::ErrorKind::NotFound, "gone"), "read");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_from_io_other_is_backend() {
        let err = Error::from_io(
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            "write",
        );
        assert!(matches!(err, Error::Backend(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Connection("down".into()).is_retryable());
        assert!(!Error::Configuration("bad".into()).is_retryable());
        assert!(!Error::UnknownDriver("x".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
    }
}
