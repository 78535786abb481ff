use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::discovery::AdvertiserError;
use crate::protocol::crypto::CryptoError;
use crate::protocol::pairing::PairingError;
use crate::protocol::rtsp::ParseError;
use crate::receiver::session::SessionError;

/// Errors that can occur while running the session server
#[derive(Debug, Error)]
pub enum ServerError {
    // ===== Startup Errors =====
    /// Failed to bind the listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound
        addr: SocketAddr,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// Service advertisement could not be started
    #[error("advertisement error: {0}")]
    Advertisement(#[from] AdvertiserError),

    /// Configuration was rejected
    #[error("invalid configuration: {field} - {message}")]
    InvalidConfig {
        /// The offending field
        field: &'static str,
        /// Description of the problem
        message: String,
    },

    // ===== Lifecycle Errors =====
    /// Server is already running
    #[error("server already running")]
    AlreadyRunning,

    /// Operation requires a running server
    #[error("server not running")]
    NotRunning,

    // ===== Per-session Errors =====
    /// Wire-level parse failure
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Session state machine violation
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Pairing failure
    #[error("pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Configuration file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        /// File that was requested
        path: std::path::PathBuf,
        /// The underlying source of the error
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be decoded
    #[error("config decode error: {0}")]
    ConfigDecode(#[from] serde_json::Error),
}

impl ServerError {
    /// Check if this error aborts the server rather than a single session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. }
                | Self::Advertisement(_)
                | Self::InvalidConfig { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigDecode(_)
        )
    }

    /// Check if this error is confined to one session
    #[must_use]
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::Session(_) | Self::Pairing(_) | Self::Network(_)
        )
    }
}

/// Result type alias for session server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::InvalidConfig {
            field: "max_sessions",
            message: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration: max_sessions - must be at least 1"
        );
    }

    #[test]
    fn test_bind_error_is_fatal() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:7000".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.is_fatal());
        assert!(!err.is_session_local());
    }

    #[test]
    fn test_parse_error_is_session_local() {
        let err: ServerError = ParseError::InvalidUtf8.into();
        assert!(err.is_session_local());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err: ServerError = io_err.into();

        assert!(matches!(err, ServerError::Network(_)));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ServerError>();
    }
}
