//! Background tasks driving one peering each.
//!
//! Every peering is owned by exactly one task, which holds the socket and
//! multiplexes three concerns with `select!`: outgoing frames handed over
//! by the endpoint, incoming bytes parsed into frames, and a shutdown
//! signal carrying the local close reason. Outbound tasks additionally run
//! the connect/backoff cycle; inbound tasks end when their connection does.
//!
//! Tasks never block the caller: `peer()` returns as soon as the task is
//! spawned, and every wait in here (connect, handshake, backoff) is bounded
//! by a timeout or cancellable through the shutdown signal.

use std::cell::RefCell;
use std::rc::Rc;

use hawser_core::{decode_event, EndpointId, NetworkProvider, Providers, TimeProvider};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::endpoint::{Admission, EndpointState};
use crate::peering::{ConnectionError, PeeringConfig, PeeringId, PeeringState};
use crate::wire::{
    serialize_frame, try_deserialize_frame, Frame, FrameError, Interests, PROTOCOL_VERSION,
};

/// Why an established link ended.
enum LinkOutcome {
    /// EOF from the remote.
    RemoteClosed,
    /// The remote sent a goodbye with this reason.
    RemoteBye(String),
    /// Deliberate local close (unpeer, shutdown, endpoint drop).
    LocalClose(String),
    /// The remote violated framing rules.
    Protocol(String),
    /// The socket failed.
    Io(String),
}

/// Drive an outbound peering: connect, handshake, pump frames, and retry
/// with exponential backoff after unexpected losses.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_outbound<P: Providers>(
    providers: P,
    config: PeeringConfig,
    peering: PeeringId,
    host: String,
    port: u16,
    state: Rc<RefCell<EndpointState>>,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<String>,
) {
    let destination = format!("{host}:{port}");
    let network = providers.network().clone();
    let time = providers.time().clone();
    let mut retry_delay = config.initial_retry_delay;
    let mut failures: u32 = 0;

    loop {
        if state.borrow().is_shutting_down() {
            end_peering(&state, peering, "endpoint shutdown", PeeringState::Disconnected);
            return;
        }

        // Serialized fresh per attempt so it carries current interests.
        let hello = match hello_bytes(&state) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(peering = %peering, error = %e, "could not serialize hello");
                end_peering(&state, peering, "hello serialization failed", PeeringState::Lost);
                return;
            }
        };
        if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
            metrics.record_connection_attempt();
        }

        let established = tokio::select! {
            reason = &mut shutdown_rx => {
                let reason = reason.unwrap_or_else(|_| "endpoint released".to_string());
                end_peering(&state, peering, &reason, PeeringState::Disconnected);
                return;
            }
            result = connect_and_greet(&network, &time, &config, &destination, &hello) => result,
        };

        match established {
            Ok((mut stream, remote, interests, mut read_buffer)) => {
                retry_delay = config.initial_retry_delay;
                failures = 0;

                let admission = state.borrow_mut().admit_remote(peering, remote, interests);
                if let Admission::Refused { reason } = admission {
                    tracing::warn!(peering = %peering, remote = %remote, reason, "refusing peering");
                    send_bye(&mut stream, reason).await;
                    end_peering(&state, peering, reason, PeeringState::Lost);
                    return;
                }

                let outcome = drive_link(
                    &mut stream,
                    &mut read_buffer,
                    peering,
                    &state,
                    &mut frame_rx,
                    &mut shutdown_rx,
                )
                .await;
                let (reason, next, retriable) = classify(outcome);
                state.borrow_mut().demote(peering, &reason, next);
                if !retriable {
                    state.borrow_mut().remove_peering(peering);
                    return;
                }
            }
            Err(e) => {
                if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
                    metrics.record_connection_failure();
                }
                failures += 1;
                tracing::debug!(peering = %peering, destination = %destination, error = %e, failures, "connection attempt failed");
            }
        }

        if !config.auto_retry {
            end_peering(&state, peering, "retries disabled", PeeringState::Lost);
            return;
        }
        if let Some(max) = config.max_retry_attempts {
            if failures >= max {
                tracing::warn!(peering = %peering, destination = %destination, attempts = failures, "giving up on peering");
                end_peering(&state, peering, "retry attempts exhausted", PeeringState::Lost);
                return;
            }
        }

        state.borrow_mut().begin_reconnect(peering);
        // Frames queued against the previous connection are stale now.
        drain_pending(&mut frame_rx);

        tokio::select! {
            reason = &mut shutdown_rx => {
                let reason = reason.unwrap_or_else(|_| "endpoint released".to_string());
                end_peering(&state, peering, &reason, PeeringState::Disconnected);
                return;
            }
            () = time.sleep(config.jittered(retry_delay)) => {}
        }
        retry_delay = config.next_retry_delay(retry_delay);
    }
}

/// Drive an accepted inbound connection for its single lifetime.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_inbound<P: Providers>(
    providers: P,
    config: PeeringConfig,
    peering: PeeringId,
    address: String,
    mut stream: <P::Network as NetworkProvider>::Stream,
    state: Rc<RefCell<EndpointState>>,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<String>,
) {
    let time = providers.time().clone();

    let hello = match hello_bytes(&state) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(peering = %peering, error = %e, "could not serialize hello");
            state.borrow_mut().remove_peering(peering);
            return;
        }
    };
    if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
        metrics.record_connection_attempt();
    }

    let handshake = tokio::select! {
        _ = &mut shutdown_rx => {
            state.borrow_mut().remove_peering(peering);
            return;
        }
        result = async {
            match time
                .timeout(config.handshake_timeout, exchange_hello(&mut stream, &hello))
                .await
            {
                Ok(inner) => inner,
                Err(_) => Err(ConnectionError::Timeout { operation: "handshake" }),
            }
        } => result,
    };

    match handshake {
        Ok((remote, interests, mut read_buffer)) => {
            let admission = state.borrow_mut().admit_remote(peering, remote, interests);
            if let Admission::Refused { reason } = admission {
                tracing::debug!(peering = %peering, remote = %remote, reason, "refusing inbound peering");
                send_bye(&mut stream, reason).await;
                state.borrow_mut().remove_peering(peering);
                return;
            }

            let outcome = drive_link(
                &mut stream,
                &mut read_buffer,
                peering,
                &state,
                &mut frame_rx,
                &mut shutdown_rx,
            )
            .await;
            let (reason, next, _) = classify(outcome);
            state.borrow_mut().demote(peering, &reason, next);
        }
        Err(e) => {
            tracing::debug!(peering = %peering, address = %address, error = %e, "inbound handshake failed");
            if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
                metrics.record_connection_failure();
            }
        }
    }

    // The remote owns reconnection for inbound links; forget the entry.
    state.borrow_mut().remove_peering(peering);
}

fn hello_bytes(state: &Rc<RefCell<EndpointState>>) -> Result<Vec<u8>, FrameError> {
    let frame = state.borrow().hello_frame();
    serialize_frame(&frame)
}

/// Demote and forget a peering as its task exits, so terminal entries do
/// not accumulate in the endpoint's map.
fn end_peering(
    state: &Rc<RefCell<EndpointState>>,
    peering: PeeringId,
    reason: &str,
    next: PeeringState,
) {
    let mut st = state.borrow_mut();
    st.demote(peering, reason, next);
    st.remove_peering(peering);
}

/// Connect with a deadline, then run the HELLO exchange with its own.
async fn connect_and_greet<N, T>(
    network: &N,
    time: &T,
    config: &PeeringConfig,
    destination: &str,
    hello: &[u8],
) -> Result<(N::Stream, EndpointId, Interests, Vec<u8>), ConnectionError>
where
    N: NetworkProvider,
    T: TimeProvider,
{
    let mut stream = match time
        .timeout(config.connect_timeout, network.connect(destination))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ConnectionError::Connect {
                details: e.to_string(),
            })
        }
        Err(_) => {
            return Err(ConnectionError::Timeout {
                operation: "connect",
            })
        }
    };

    match time
        .timeout(config.handshake_timeout, exchange_hello(&mut stream, hello))
        .await
    {
        Ok(Ok((remote, interests, leftover))) => Ok((stream, remote, interests, leftover)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ConnectionError::Timeout {
            operation: "handshake",
        }),
    }
}

/// Symmetric HELLO exchange: write ours immediately, then read until the
/// remote's arrives. Returns the remote identity, its interests, and any
/// bytes that followed the HELLO in the read stream.
async fn exchange_hello<S>(
    stream: &mut S,
    hello: &[u8],
) -> Result<(EndpointId, Interests, Vec<u8>), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(hello).await?;

    let mut buffer: Vec<u8> = Vec::with_capacity(256);
    loop {
        match try_deserialize_frame(&buffer) {
            Ok(Some((
                Frame::Hello {
                    version,
                    id,
                    interests,
                },
                consumed,
            ))) => {
                if version != PROTOCOL_VERSION {
                    return Err(ConnectionError::Handshake {
                        details: format!("unsupported protocol version {version}"),
                    });
                }
                let leftover = buffer.split_off(consumed);
                return Ok((id, interests, leftover));
            }
            Ok(Some((frame, _))) => {
                return Err(ConnectionError::Handshake {
                    details: format!("expected HELLO, got {}", frame_name(&frame)),
                });
            }
            Ok(None) => {}
            Err(e) => {
                return Err(ConnectionError::Handshake {
                    details: e.to_string(),
                });
            }
        }

        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConnectionError::Closed);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

/// Pump frames in both directions until the link ends.
async fn drive_link<S>(
    stream: &mut S,
    read_buffer: &mut Vec<u8>,
    peering: PeeringId,
    state: &Rc<RefCell<EndpointState>>,
    frame_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown_rx: &mut oneshot::Receiver<String>,
) -> LinkOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // The remote may have pipelined frames right behind its HELLO; those
    // bytes are already in the buffer and no further read will announce
    // them, so dispatch them before waiting on the socket.
    if let Some(outcome) = drain_frames(read_buffer, peering, state) {
        return outcome;
    }

    loop {
        tokio::select! {
            reason = &mut *shutdown_rx => {
                let reason = reason.unwrap_or_else(|_| "endpoint released".to_string());
                send_bye(stream, &reason).await;
                return LinkOutcome::LocalClose(reason);
            }

            outbound = frame_rx.recv() => {
                let Some(bytes) = outbound else {
                    return LinkOutcome::LocalClose("endpoint released".to_string());
                };
                if let Err(e) = stream.write_all(&bytes).await {
                    return LinkOutcome::Io(e.to_string());
                }
                if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
                    metrics.record_frame_sent(bytes.len());
                }
            }

            read = async {
                let mut chunk = vec![0u8; 4096];
                stream.read(&mut chunk).await.map(|n| (chunk, n))
            } => {
                match read {
                    Ok((_, 0)) => return LinkOutcome::RemoteClosed,
                    Ok((chunk, n)) => {
                        read_buffer.extend_from_slice(&chunk[..n]);
                        if let Some(outcome) = drain_frames(read_buffer, peering, state) {
                            return outcome;
                        }
                    }
                    Err(e) => return LinkOutcome::Io(e.to_string()),
                }
            }
        }
    }
}

/// Parse every complete frame out of the buffer and dispatch it.
///
/// A payload that fails to decode costs only that message; a frame-level
/// violation (bad checksum, unknown kind, malformed body) ends the link.
fn drain_frames(
    read_buffer: &mut Vec<u8>,
    peering: PeeringId,
    state: &Rc<RefCell<EndpointState>>,
) -> Option<LinkOutcome> {
    loop {
        match try_deserialize_frame(read_buffer) {
            Ok(Some((frame, consumed))) => {
                if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
                    metrics.record_frame_received(consumed);
                }
                read_buffer.drain(..consumed);

                match frame {
                    Frame::Data { topic, payload } => match decode_event(&payload) {
                        Ok(event) => state.borrow().route_inbound(peering, topic, event),
                        Err(e) => {
                            tracing::warn!(peering = %peering, topic = %topic, error = %e, "discarding message with undecodable payload");
                            if let Some(metrics) = state.borrow_mut().metrics_mut(peering) {
                                metrics.record_payload_decode_failure();
                            }
                        }
                    },
                    Frame::Interest { interests } => {
                        tracing::debug!(peering = %peering, "peer updated its interests");
                        state.borrow_mut().update_interests(peering, interests);
                    }
                    Frame::Bye { reason } => return Some(LinkOutcome::RemoteBye(reason)),
                    Frame::Hello { .. } => {
                        return Some(LinkOutcome::Protocol(
                            "unexpected HELLO after handshake".to_string(),
                        ));
                    }
                }
            }
            Ok(None) => return None,
            Err(e) => return Some(LinkOutcome::Protocol(e.to_string())),
        }
    }
}

/// Best-effort goodbye; the link is ending either way.
async fn send_bye<S: AsyncWrite + Unpin>(stream: &mut S, reason: &str) {
    let frame = Frame::Bye {
        reason: reason.to_string(),
    };
    if let Ok(bytes) = serialize_frame(&frame) {
        let _ = stream.write_all(&bytes).await;
    }
}

/// Map a link outcome to the `peer_lost` reason, the next peering state,
/// and whether an outbound task should try again.
fn classify(outcome: LinkOutcome) -> (String, PeeringState, bool) {
    match outcome {
        LinkOutcome::RemoteClosed => (
            "connection closed by remote".to_string(),
            PeeringState::Lost,
            true,
        ),
        LinkOutcome::RemoteBye(reason) => (
            format!("peer disconnected: {reason}"),
            PeeringState::Lost,
            false,
        ),
        LinkOutcome::LocalClose(reason) => (reason, PeeringState::Disconnected, false),
        LinkOutcome::Protocol(details) => (
            format!("protocol violation: {details}"),
            PeeringState::Lost,
            true,
        ),
        LinkOutcome::Io(details) => (format!("I/O error: {details}"), PeeringState::Lost, true),
    }
}

fn drain_pending(frame_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) {
    while frame_rx.try_recv().is_ok() {}
}

fn frame_name(frame: &Frame) -> &'static str {
    match frame {
        Frame::Hello { .. } => "HELLO",
        Frame::Data { .. } => "DATA",
        Frame::Interest { .. } => "INTEREST",
        Frame::Bye { .. } => "BYE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawser_core::Topic;

    fn hello_for(id: EndpointId) -> Vec<u8> {
        serialize_frame(&Frame::Hello {
            version: PROTOCOL_VERSION,
            id,
            interests: Interests::All,
        })
        .expect("serialize hello")
    }

    #[tokio::test]
    async fn test_exchange_hello_is_symmetric() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let id_a = EndpointId::random();
        let id_b = EndpointId::random();
        let hello_a = hello_for(id_a);
        let hello_b = hello_for(id_b);

        let (on_a, on_b) = tokio::join!(
            exchange_hello(&mut a, &hello_a),
            exchange_hello(&mut b, &hello_b),
        );

        let (remote_of_a, interests, leftover) = on_a.expect("handshake on a");
        assert_eq!(remote_of_a, id_b);
        assert_eq!(interests, Interests::All);
        assert!(leftover.is_empty());

        let (remote_of_b, _, _) = on_b.expect("handshake on b");
        assert_eq!(remote_of_b, id_a);
    }

    #[tokio::test]
    async fn test_exchange_hello_rejects_unsupported_version() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let bad_hello = serialize_frame(&Frame::Hello {
            version: 99,
            id: EndpointId::random(),
            interests: Interests::All,
        })
        .expect("serialize");
        b.write_all(&bad_hello).await.expect("write");

        let ours = hello_for(EndpointId::random());
        let result = exchange_hello(&mut a, &ours).await;
        match result {
            Err(ConnectionError::Handshake { details }) => {
                assert!(details.contains("version 99"), "details: {details}");
            }
            other => panic!("expected handshake error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_hello_rejects_non_hello_first_frame() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let data = serialize_frame(&Frame::Data {
            topic: Topic::new("/test").expect("topic"),
            payload: vec![1, 2, 3],
        })
        .expect("serialize");
        b.write_all(&data).await.expect("write");

        let ours = hello_for(EndpointId::random());
        let result = exchange_hello(&mut a, &ours).await;
        match result {
            Err(ConnectionError::Handshake { details }) => {
                assert!(details.contains("DATA"), "details: {details}");
            }
            other => panic!("expected handshake error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_hello_carries_leftover_bytes() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let mut wire = hello_for(EndpointId::random());
        let trailing = serialize_frame(&Frame::Bye {
            reason: "early".to_string(),
        })
        .expect("serialize");
        wire.extend_from_slice(&trailing);
        b.write_all(&wire).await.expect("write");

        let ours = hello_for(EndpointId::random());
        let (_, _, leftover) = exchange_hello(&mut a, &ours).await.expect("handshake");
        assert_eq!(leftover, trailing);
    }

    #[tokio::test]
    async fn test_exchange_hello_detects_eof() {
        let (mut a, b) = tokio::io::duplex(4096);
        drop(b);

        let ours = hello_for(EndpointId::random());
        assert!(exchange_hello(&mut a, &ours).await.is_err());
    }

    #[test]
    fn test_classify_retriability() {
        let (_, next, retry) = classify(LinkOutcome::RemoteClosed);
        assert_eq!(next, PeeringState::Lost);
        assert!(retry);

        let (reason, next, retry) = classify(LinkOutcome::RemoteBye("done".to_string()));
        assert!(reason.contains("done"));
        assert_eq!(next, PeeringState::Lost);
        assert!(!retry);

        let (reason, next, retry) = classify(LinkOutcome::LocalClose("unpeered".to_string()));
        assert_eq!(reason, "unpeered");
        assert_eq!(next, PeeringState::Disconnected);
        assert!(!retry);

        let (_, _, retry) = classify(LinkOutcome::Protocol("bad frame".to_string()));
        assert!(retry);
    }
}
