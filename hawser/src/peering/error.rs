//! Connection-level failure descriptions.

use std::io;

use thiserror::Error;

/// Why a connection attempt or an established link failed.
///
/// These never surface from endpoint API calls. They drive the retry loop
/// and become the human-readable reason string carried by `peer_lost`
/// status events.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// The TCP connection could not be established.
    #[error("connect failed: {details}")]
    Connect {
        /// Socket-level failure description.
        details: String,
    },

    /// An operation did not complete within its configured deadline.
    #[error("{operation} timed out")]
    Timeout {
        /// Which phase timed out, e.g. `"connect"` or `"handshake"`.
        operation: &'static str,
    },

    /// The HELLO exchange failed or the remote spoke a different protocol.
    #[error("handshake failed: {details}")]
    Handshake {
        /// What was wrong with the exchange.
        details: String,
    },

    /// The remote violated framing rules after the handshake.
    #[error("protocol violation: {details}")]
    Protocol {
        /// Description of the violating frame.
        details: String,
    },

    /// The remote closed the connection.
    #[error("connection closed by remote")]
    Closed,

    /// A read or write on the established link failed.
    #[error("I/O error: {details}")]
    Io {
        /// Socket-level failure description.
        details: String,
    },
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        ConnectionError::Io {
            details: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_operation() {
        let err = ConnectionError::Timeout {
            operation: "handshake",
        };
        assert_eq!(err.to_string(), "handshake timed out");
    }

    #[test]
    fn test_io_error_converts() {
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err: ConnectionError = io.into();
        assert!(err.to_string().contains("reset by peer"));
    }
}
