//! Error types for gridlink operations.

use std::io;
use thiserror::Error;

/// The main error type for gridlink operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// The connection carrying a request failed or closed (network failures, disconnections).
    #[error("transport error: {0}")]
    Transport(String),

    /// The invocation or handshake deadline elapsed.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// The cluster topology cannot serve the request right now (unknown partition
    /// owner, member left, partition migrating).
    #[error("topology error: {0}")]
    Topology(String),

    /// An error raised by the server while executing the operation.
    ///
    /// Surfaced verbatim to the caller and never retried.
    #[error("application error {code} ({class_name}): {message}")]
    Application {
        /// Server-side error code.
        code: i32,
        /// Server-side error class name.
        class_name: String,
        /// Server-side error message.
        message: String,
    },

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Authentication errors (rejected credentials, wrong cluster name).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Protocol-related errors (malformed or oversized frames, unexpected message types).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client holds no live connection to the cluster.
    #[error("client is offline: {0}")]
    ClientOffline(String),

    /// Payload serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GridError {
    /// Returns true if an invocation failing with this error may be attempted again.
    ///
    /// Only transport, topology and I/O failures qualify. Timeouts are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GridError::Transport(_) | GridError::Topology(_) | GridError::Io(_)
        )
    }

    /// Returns a short, stable name of the error kind, suitable for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GridError::Transport(_) => "transport",
            GridError::Timeout(_) => "timeout",
            GridError::Topology(_) => "topology",
            GridError::Application { .. } => "application",
            GridError::Configuration(_) => "configuration",
            GridError::Authentication(_) => "authentication",
            GridError::Protocol(_) => "protocol",
            GridError::ClientOffline(_) => "client_offline",
            GridError::Serialization(_) => "serialization",
            GridError::Io(_) => "io",
        }
    }
}

/// A specialized `Result` type for gridlink operations.
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = GridError::Transport("connection reset by member".to_string());
        assert_eq!(err.to_string(), "transport error: connection reset by member");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = GridError::Timeout("operation timed out after 30s".to_string());
        assert_eq!(err.to_string(), "timeout error: operation timed out after 30s");
    }

    #[test]
    fn test_application_error_display() {
        let err = GridError::Application {
            code: 12,
            class_name: "java.lang.IllegalStateException".to_string(),
            message: "map is locked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "application error 12 (java.lang.IllegalStateException): map is locked"
        );
    }

    #[test]
    fn test_configuration_error_display() {
        let err = GridError::Configuration("invalid timeout value".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid timeout value");
    }

    #[test]
    fn test_client_offline_display() {
        let err = GridError::ClientOffline("no live connections".to_string());
        assert_eq!(err.to_string(), "client is offline: no live connections");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GridError::Transport("x".into()).is_retryable());
        assert!(GridError::Topology("x".into()).is_retryable());
        assert!(GridError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "x")).is_retryable());

        assert!(!GridError::Timeout("x".into()).is_retryable());
        assert!(!GridError::Authentication("x".into()).is_retryable());
        assert!(!GridError::Protocol("x".into()).is_retryable());
        assert!(!GridError::ClientOffline("x".into()).is_retryable());
        assert!(!GridError::Serialization("x".into()).is_retryable());
        assert!(!GridError::Configuration("x".into()).is_retryable());
        assert!(!GridError::Application {
            code: 1,
            class_name: String::new(),
            message: String::new(),
        }
        .is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: GridError = io_err.into();
        assert!(matches!(err, GridError::Io(_)));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GridError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(GridError::Timeout("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
