//! Errors surfaced by endpoint operations.

use thiserror::Error;

use crate::wire::FrameError;

/// Errors returned by [`Endpoint`](crate::Endpoint) operations.
///
/// Connection-level failures never appear here: a lost or unreachable peer
/// is reported through a `peer_lost` status event while the affected peering
/// retries or winds down on its own.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint has been shut down and accepts no further operations.
    #[error("endpoint has been shut down")]
    ShutDown,

    /// Binding a listener socket failed.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// A published message could not be framed for the wire.
    #[error("failed to frame message: {0}")]
    Frame(#[from] FrameError),
}
