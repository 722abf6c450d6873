//! Error types for cast discovery.

use thiserror::Error;

/// Primary error type for discovery operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Streaming discovery requires a callback")]
    MissingCallback,
}

/// Errors from the mDNS client backend.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    #[error("Announcement query failed: {0}")]
    Query(String),

    #[error("Announcement not resolved within the query budget")]
    QueryTimeout,
}

/// Errors constructing a connectable client for a matched device.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection refused by {host}:{port}")]
    Refused { host: String, port: u16 },

    #[error("Connection timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection failed: {0}")]
    Failed(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let discovery_err = Error::Discovery(DiscoveryError::QueryTimeout);
        assert!(discovery_err.to_string().contains("Discovery error"));
        assert!(discovery_err.to_string().contains("query budget"));

        let connect_err = Error::Connect(ConnectError::Refused {
            host: "192.168.1.12".to_string(),
            port: 8009,
        });
        assert!(connect_err.to_string().contains("Connection error"));
        assert!(connect_err.to_string().contains("192.168.1.12:8009"));

        let callback_err = Error::MissingCallback;
        assert!(callback_err.to_string().contains("callback"));
    }

    #[test]
    fn error_conversions() {
        let err: Error = DiscoveryError::Daemon("boom".to_string()).into();
        assert!(matches!(err, Error::Discovery(_)));

        let err: Error = ConnectError::Timeout.into();
        assert!(matches!(err, Error::Connect(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let err: Error = ConnectError::from(io_err).into();
        assert!(matches!(err, Error::Connect(ConnectError::Io(_))));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::Discovery(DiscoveryError::QueryTimeout);
        assert!(err.source().is_some());
    }
}
