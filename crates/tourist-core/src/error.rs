//! Error types for the location photo cache.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using the photo cache's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for photo cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure reaching the search API or an image host
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or unexpected response payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Writing or deleting a cached image file failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// A populate attempt for a location failed
    #[error("Fetch failed for location {location_id}: {source}")]
    Fetch {
        location_id: Uuid,
        #[source]
        source: Box<Error>,
    },

    /// Downloaded payload could not be decoded or re-encoded
    #[error("Image error: {0}")]
    Image(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Location not found
    #[error("Location not found: {0}")]
    LocationNotFound(Uuid),

    /// A record with the same identity already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a populate failure for `location_id`.
    pub fn fetch(location_id: Uuid, source: Error) -> Self {
        Error::Fetch {
            location_id,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::FileSystem(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_network() {
        let err = Error::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");
    }

    #[test]
    fn test_error_display_parse() {
        let err = Error::Parse("missing photos".to_string());
        assert_eq!(err.to_string(), "Parse error: missing photos");
    }

    #[test]
    fn test_error_display_invalid_argument() {
        let err = Error::InvalidArgument("k must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid argument: k must be positive");
    }

    #[test]
    fn test_error_display_location_not_found() {
        let id = Uuid::nil();
        let err = Error::LocationNotFound(id);
        assert_eq!(err.to_string(), format!("Location not found: {}", id));
    }

    #[test]
    fn test_fetch_error_wraps_source() {
        let id = Uuid::new_v4();
        let err = Error::fetch(id, Error::Network("timed out".to_string()));
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("Network error: timed out"));

        let source = std::error::Error::source(&err).expect("fetch error has a source");
        assert_eq!(source.to_string(), "Network error: timed out");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::FileSystem(msg) => assert!(msg.contains("access denied")),
            other => panic!("Expected FileSystem error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
