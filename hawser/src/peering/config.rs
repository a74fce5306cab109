//! Configuration for peering connection and retry behavior.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one peering's connection lifecycle.
///
/// Outbound peerings retry lost connections with exponential backoff;
/// inbound peerings never retry, the remote side owns reconnection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeeringConfig {
    /// Delay before the first reconnection attempt.
    pub initial_retry_delay: Duration,

    /// Upper bound on the backoff delay between attempts.
    pub max_retry_delay: Duration,

    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,

    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,

    /// Timeout for the HELLO exchange once the socket is up.
    pub handshake_timeout: Duration,

    /// Whether an outbound peering reconnects after an unexpected loss.
    pub auto_retry: bool,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means unlimited retries.
    pub max_retry_attempts: Option<u32>,
}

impl Default for PeeringConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            auto_retry: true,
            max_retry_attempts: None,
        }
    }
}

impl PeeringConfig {
    /// Configuration for low-latency local networking, as used in tests.
    pub fn local_network() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            connect_timeout: Duration::from_millis(500),
            handshake_timeout: Duration::from_millis(500),
            auto_retry: true,
            max_retry_attempts: Some(10),
        }
    }

    /// Configuration for high-latency WAN networking.
    pub fn wan() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            auto_retry: true,
            max_retry_attempts: None,
        }
    }

    /// Compute the backoff delay that follows `current`, capped at
    /// [`PeeringConfig::max_retry_delay`].
    pub fn next_retry_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_retry_delay)
    }

    /// Apply ±20% jitter to a backoff delay so peers that lost the same
    /// remote do not reconnect in lockstep.
    pub fn jittered(&self, delay: Duration) -> Duration {
        delay.mul_f64(rand::random_range(0.8..1.2))
    }
}
