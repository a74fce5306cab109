//! Per-peering counters.

/// Counters tracking one peering's connection history and traffic.
///
/// A snapshot is exposed through the endpoint's peering status API; the
/// connection task updates the live copy as it works.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeeringMetrics {
    /// Connection attempts made, including retries.
    pub connection_attempts: u64,

    /// Connections that completed the handshake.
    pub connections_established: u64,

    /// Attempts that failed to connect or to complete the handshake.
    pub connection_failures: u64,

    /// Consecutive failures since the last successful connection.
    pub consecutive_failures: u32,

    /// Frames written to the link.
    pub frames_sent: u64,

    /// Frames parsed from the link.
    pub frames_received: u64,

    /// Bytes written to the link.
    pub bytes_sent: u64,

    /// Bytes consumed as complete frames from the link.
    pub bytes_received: u64,

    /// Data frames whose payload failed to decode and was discarded.
    pub payload_decode_failures: u64,
}

impl PeeringMetrics {
    /// Record a connection attempt.
    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
    }

    /// Record a completed handshake.
    pub fn record_connection_established(&mut self) {
        self.connections_established += 1;
        self.consecutive_failures = 0;
    }

    /// Record a failed attempt.
    pub fn record_connection_failure(&mut self) {
        self.connection_failures += 1;
        self.consecutive_failures += 1;
    }

    /// Record a frame written to the link.
    pub fn record_frame_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a frame parsed from the link.
    pub fn record_frame_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Record a data frame dropped because its payload would not decode.
    pub fn record_payload_decode_failure(&mut self) {
        self.payload_decode_failures += 1;
    }

    /// Fraction of attempts that established, as a percentage.
    pub fn connection_success_rate(&self) -> f64 {
        if self.connection_attempts == 0 {
            100.0
        } else {
            (self.connections_established as f64 / self.connection_attempts as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut metrics = PeeringMetrics::default();
        metrics.record_connection_attempt();
        metrics.record_connection_failure();
        metrics.record_connection_attempt();
        metrics.record_connection_failure();
        assert_eq!(metrics.consecutive_failures, 2);

        metrics.record_connection_attempt();
        metrics.record_connection_established();
        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.connection_failures, 2);
        assert_eq!(metrics.connection_attempts, 3);
    }

    #[test]
    fn test_success_rate() {
        let mut metrics = PeeringMetrics::default();
        assert_eq!(metrics.connection_success_rate(), 100.0);

        metrics.record_connection_attempt();
        metrics.record_connection_failure();
        metrics.record_connection_attempt();
        metrics.record_connection_established();
        assert_eq!(metrics.connection_success_rate(), 50.0);
    }

    #[test]
    fn test_traffic_counters_track_bytes() {
        let mut metrics = PeeringMetrics::default();
        metrics.record_frame_sent(64);
        metrics.record_frame_sent(16);
        metrics.record_frame_received(32);
        assert_eq!(metrics.frames_sent, 2);
        assert_eq!(metrics.bytes_sent, 80);
        assert_eq!(metrics.frames_received, 1);
        assert_eq!(metrics.bytes_received, 32);
    }
}
