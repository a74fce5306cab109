//! Peering lifecycle and connection management.
//!
//! A peering is one managed link to a remote endpoint. Each peering is
//! driven by a dedicated background task that owns the socket, so a failure
//! on one link never disturbs another.
//!
//! # Connection Lifecycle
//!
//! ```text
//! ┌────────────┐   handshake ok    ┌───────────┐
//! │ Connecting │ ────────────────► │ Connected │
//! └────────────┘                   └───────────┘
//!    ▲    │                          │       │
//!    │    │ retries exhausted,       │       │ unpeer() /
//!    │    │ self- or duplicate       │       │ shutdown()
//!    │    │ peering                  │       ▼
//!    │    ▼                          │  ┌──────────────┐
//!    │  ┌──────┐   unexpected loss   │  │ Disconnected │
//!    └──┤ Lost │ ◄───────────────────┘  └──────────────┘
//!  retry└──────┘
//! (outbound, auto_retry)
//! ```
//!
//! Every transition out of `Connected` synthesizes a `peer_lost` status
//! event; every arrival in `Connected` synthesizes `peer_added`. Outbound
//! peerings reconnect with exponential backoff after an unexpected loss;
//! inbound peerings end when their connection does.

mod config;
pub(crate) mod core;
mod error;
mod metrics;

use std::fmt;

use hawser_core::EndpointId;

pub use config::PeeringConfig;
pub use error::ConnectionError;
pub use metrics::PeeringMetrics;

/// Identifier for one peering within its endpoint.
///
/// Ids are allocated sequentially and never reused for the lifetime of the
/// endpoint, so a retried or replaced peering is distinguishable from the
/// one it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeeringId(u64);

impl PeeringId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for PeeringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a peering currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringState {
    /// Establishing the connection, including backoff between attempts.
    Connecting,
    /// Handshake complete; data frames flow.
    Connected,
    /// Deliberately closed by this endpoint; never retried.
    Disconnected,
    /// Ended without a local close: remote failure, protocol violation,
    /// exhausted retries, or a self/duplicate peering refused at handshake.
    Lost,
}

impl PeeringState {
    /// Whether the peering's background task is still at work.
    pub fn is_active(self) -> bool {
        matches!(self, PeeringState::Connecting | PeeringState::Connected)
    }
}

impl fmt::Display for PeeringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeeringState::Connecting => "connecting",
            PeeringState::Connected => "connected",
            PeeringState::Disconnected => "disconnected",
            PeeringState::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// Which side initiated a peering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringDirection {
    /// Initiated locally via `peer()`; owns reconnection.
    Outbound,
    /// Accepted from a listener; the remote owns reconnection.
    Inbound,
}

impl fmt::Display for PeeringDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeeringDirection::Outbound => "outbound",
            PeeringDirection::Inbound => "inbound",
        };
        f.write_str(name)
    }
}

/// Point-in-time snapshot of one peering, as reported by
/// [`Endpoint::peerings`](crate::Endpoint::peerings).
#[derive(Debug, Clone)]
pub struct PeeringStatus {
    /// Identifier within the owning endpoint.
    pub id: PeeringId,
    /// Remote address, `host:port`.
    pub address: String,
    /// Which side initiated the link.
    pub direction: PeeringDirection,
    /// Lifecycle state at snapshot time.
    pub state: PeeringState,
    /// Remote endpoint identity, known once a handshake has completed.
    pub remote_id: Option<EndpointId>,
    /// Traffic and connection counters.
    pub metrics: PeeringMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PeeringState::Connecting.to_string(), "connecting");
        assert_eq!(PeeringState::Lost.to_string(), "lost");
    }

    #[test]
    fn test_active_states() {
        assert!(PeeringState::Connecting.is_active());
        assert!(PeeringState::Connected.is_active());
        assert!(!PeeringState::Disconnected.is_active());
        assert!(!PeeringState::Lost.is_active());
    }

    #[test]
    fn test_peering_id_display() {
        assert_eq!(PeeringId::new(7).to_string(), "7");
    }
}
