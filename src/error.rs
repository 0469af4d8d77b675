//! Error taxonomy for the storage engine.
//!
//! Primary-store failures ([`Error::Io`], [`Error::NotFound`], ...) are
//! returned to the caller as-is. Secondary-index failures are logged by the
//! engine and repaired by reconciliation, so callers only ever see them from
//! query paths.

use thiserror::Error;

/// Result alias used by every storage-layer API.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No record exists for the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad pagination, empty query term, malformed date or filename.
    #[error("validation error: {0}")]
    Validation(String),

    /// The embedding or summarization provider failed or timed out.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Disk or database read/write failure.
    #[error("io error: {0}")]
    Io(String),

    /// An engine method was called before `initialize()` (or after `close()`).
    #[error("storage engine is not initialized")]
    NotInitialized,

    /// An index is unreadable or inconsistent and must be rebuilt.
    #[error("index corruption: {0}")]
    Corruption(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("malformed") || lower.contains("not a database") || lower.contains("corrupt") {
            Self::Corruption(msg)
        } else {
            Self::Io(msg)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Corruption(format!("stored json is unreadable: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_io() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, Error::Io(ref m) if m.contains("disk full")));
    }

    #[test]
    fn test_bad_json_maps_to_corruption() {
        let parse = serde_json::from_str::<Vec<String>>("[not json").unwrap_err();
        let err: Error = parse.into();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = Error::not_found("session 2025-01-01");
        assert_eq!(err.to_string(), "not found: session 2025-01-01");
        assert!(err.is_not_found());
    }
}
