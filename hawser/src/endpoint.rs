//! The endpoint: subscriptions, peerings, and the fan-out paths between them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use hawser_core::{
    encode_event, EndpointId, Event, NetworkListener, NetworkProvider, Providers, TaskProvider,
    TokioProviders, Topic, Value,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::EndpointError;
use crate::peering::core::{run_inbound, run_outbound};
use crate::peering::{
    PeeringConfig, PeeringDirection, PeeringId, PeeringMetrics, PeeringState, PeeringStatus,
};
use crate::subscriber::{QueuePolicy, Subscriber, SubscriptionRegistry};
use crate::wire::{serialize_frame, Frame, Interests, PROTOCOL_VERSION};

/// Name of the status event synthesized when a peering completes its
/// handshake. Arguments: remote endpoint id, remote address.
pub const PEER_ADDED: &str = "peer_added";

/// Name of the status event synthesized when an established peering ends.
/// Arguments: remote endpoint id, remote address, human-readable reason.
pub const PEER_LOST: &str = "peer_lost";

/// Endpoint-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointLifecycle {
    /// Accepting operations.
    Running,
    /// `shutdown()` in progress; new operations are refused.
    ShuttingDown,
    /// Fully stopped; all sockets closed and queues ended.
    Stopped,
}

/// Endpoint-wide configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Connection and retry behavior applied to every peering.
    pub peering: PeeringConfig,

    /// Capacity policy applied to subscriptions created via
    /// [`Endpoint::subscribe`].
    pub queue_policy: QueuePolicy,

    /// Advertise the local subscription list to peers instead of
    /// `all topics`, so peers skip forwarding messages nothing here wants.
    /// Advisory only; inbound messages are always filtered against the
    /// local subscription table regardless.
    pub advertise_subscriptions: bool,
}

/// A process-local pub/sub participant.
///
/// An endpoint owns its subscriptions and peerings exclusively. Messages
/// published here are delivered synchronously to matching local
/// subscriptions and forwarded in the background to every connected peering
/// whose advertised interest matches; messages arriving from peers are
/// decoded and fanned out to local subscriptions only, never relayed
/// onward.
///
/// Peering state changes surface as `peer_added` / `peer_lost` events on
/// the reserved status topic ([`Topic::status`]); these are synthesized
/// locally on each side and never cross the wire.
///
/// ```ignore
/// let endpoint = Endpoint::new(EndpointConfig::default());
/// let port = endpoint.listen("127.0.0.1", 0).await?;
/// let messages = endpoint.subscribe(Topic::new("/test")?)?;
/// endpoint.publish(Topic::new("/test")?, Event::new("ping", vec![]))?;
/// while let Some((topic, event)) = messages.recv().await {
///     println!("{topic}: {event}");
/// }
/// ```
pub struct Endpoint<P: Providers = TokioProviders> {
    providers: P,
    state: Rc<RefCell<EndpointState>>,
}

impl Endpoint<TokioProviders> {
    /// Create an endpoint backed by real sockets, timers, and `spawn_local`.
    ///
    /// Must run inside a `tokio::task::LocalSet` on a current-thread
    /// runtime, like every spawning operation on this type.
    pub fn new(config: EndpointConfig) -> Self {
        Self::with_providers(TokioProviders::new(), config)
    }
}

impl<P: Providers> Endpoint<P> {
    /// Create an endpoint on top of an explicit provider bundle.
    pub fn with_providers(providers: P, config: EndpointConfig) -> Self {
        let id = EndpointId::random();
        tracing::debug!(endpoint = %id, "creating endpoint");
        let state = Rc::new(RefCell::new(EndpointState {
            id,
            config,
            lifecycle: EndpointLifecycle::Running,
            registry: Rc::new(RefCell::new(SubscriptionRegistry::new())),
            peerings: HashMap::new(),
            outbound_index: HashMap::new(),
            next_peering: 0,
            listeners: Vec::new(),
        }));
        Self { providers, state }
    }

    /// This endpoint's identity, as presented to peers during handshakes.
    pub fn id(&self) -> EndpointId {
        self.state.borrow().id
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> EndpointLifecycle {
        self.state.borrow().lifecycle
    }

    /// Open a listening socket and accept inbound peerings on it.
    ///
    /// Port `0` requests an OS-assigned ephemeral port; the actual bound
    /// port is returned either way so it can be handed to a remote peer
    /// out of band.
    pub async fn listen(&self, host: &str, port: u16) -> Result<u16, EndpointError> {
        if self.state.borrow().is_shutting_down() {
            return Err(EndpointError::ShutDown);
        }

        let addr = format!("{host}:{port}");
        let listener =
            self.providers
                .network()
                .bind(&addr)
                .await
                .map_err(|source| EndpointError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
        let local = listener
            .local_addr()
            .map_err(|source| EndpointError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            let mut st = self.state.borrow_mut();
            // Re-check: shutdown may have raced the bind.
            if st.is_shutting_down() {
                return Err(EndpointError::ShutDown);
            }
            let task = self.providers.tasks().spawn_task(
                &format!("listener-{}", local.port()),
                accept_loop(
                    self.providers.clone(),
                    listener,
                    self.state.clone(),
                    shutdown_rx,
                ),
            );
            st.listeners.push(ListenerEntry {
                shutdown_tx: Some(shutdown_tx),
                task: Some(task),
            });
        }
        tracing::debug!(address = %local, "listening");
        Ok(local.port())
    }

    /// Initiate an outbound peering to `host:port`.
    ///
    /// Returns immediately; connection, handshake, and retries happen on a
    /// background task. Idempotent while an equivalent peering is still
    /// active: calling again returns the existing id. Once that peering has
    /// ended, calling again starts a fresh one.
    pub fn peer(&self, host: &str, port: u16) -> Result<PeeringId, EndpointError> {
        let mut st = self.state.borrow_mut();
        if st.is_shutting_down() {
            return Err(EndpointError::ShutDown);
        }

        let key = (host.to_string(), port);
        if let Some(&existing) = st.outbound_index.get(&key) {
            if st
                .peerings
                .get(&existing)
                .is_some_and(|entry| entry.state.is_active())
            {
                return Ok(existing);
            }
            st.peerings.remove(&existing);
        }

        let id = st.allocate_peering_id();
        let address = format!("{host}:{port}");
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = self.providers.tasks().spawn_task(
            &format!("peering-out-{id}"),
            run_outbound(
                self.providers.clone(),
                st.config.peering.clone(),
                id,
                host.to_string(),
                port,
                self.state.clone(),
                frame_rx,
                shutdown_rx,
            ),
        );
        st.peerings.insert(
            id,
            PeeringEntry {
                id,
                address: address.clone(),
                direction: PeeringDirection::Outbound,
                state: PeeringState::Connecting,
                remote_id: None,
                interests: Interests::All,
                frame_tx,
                shutdown_tx: Some(shutdown_tx),
                metrics: PeeringMetrics::default(),
                task: Some(task),
            },
        );
        st.outbound_index.insert(key, id);
        tracing::debug!(peering = %id, address = %address, "initiating outbound peering");
        Ok(id)
    }

    /// Deliberately close the outbound peering to `host:port`.
    ///
    /// Cancels any retry in progress, sends a goodbye if the link is up,
    /// and transitions the peering to `Disconnected` without retry; its
    /// task forgets the entry as it exits. Returns whether such a peering
    /// was still present.
    pub fn unpeer(&self, host: &str, port: u16) -> bool {
        let mut st = self.state.borrow_mut();
        let key = (host.to_string(), port);
        let Some(id) = st.outbound_index.remove(&key) else {
            return false;
        };
        let Some(entry) = st.peerings.get_mut(&id) else {
            return false;
        };
        if let Some(tx) = entry.shutdown_tx.take() {
            let _ = tx.send("unpeered locally".to_string());
        }
        tracing::debug!(peering = %id, "unpeering");
        true
    }

    /// Register interest in a topic prefix using the endpoint's configured
    /// queue policy.
    ///
    /// The subscription receives both locally published and remotely
    /// arriving messages whose topic matches per segment-aligned prefix
    /// rules. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, topic: Topic) -> Result<Subscriber, EndpointError> {
        let policy = self.state.borrow().config.queue_policy;
        self.subscribe_with_policy(topic, policy)
    }

    /// Register interest in a topic prefix with an explicit queue policy.
    pub fn subscribe_with_policy(
        &self,
        topic: Topic,
        policy: QueuePolicy,
    ) -> Result<Subscriber, EndpointError> {
        let (registry, advertise) = {
            let st = self.state.borrow();
            if st.is_shutting_down() {
                return Err(EndpointError::ShutDown);
            }
            (st.registry.clone(), st.config.advertise_subscriptions)
        };
        let subscriber = SubscriptionRegistry::register(&registry, topic.clone(), policy);
        tracing::debug!(topic = %topic, "subscribed");
        if advertise {
            self.broadcast_interests();
        }
        Ok(subscriber)
    }

    /// Re-advertise the local subscription list to every connected peering.
    fn broadcast_interests(&self) {
        let st = self.state.borrow();
        let frame = Frame::Interest {
            interests: st.local_interests(),
        };
        let bytes = match serialize_frame(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize interest advertisement");
                return;
            }
        };
        for entry in st
            .peerings
            .values()
            .filter(|e| e.state == PeeringState::Connected)
        {
            let _ = entry.frame_tx.send(bytes.clone());
        }
    }

    /// Publish an event on a topic.
    ///
    /// Delivers synchronously to every matching local subscription in
    /// registration order, then hands the encoded message to every
    /// connected peering whose advertised interest matches the topic. The
    /// reserved status namespace is delivered locally but never forwarded.
    pub fn publish(&self, topic: Topic, event: Event) -> Result<(), EndpointError> {
        let targets = {
            let st = self.state.borrow();
            if st.lifecycle != EndpointLifecycle::Running {
                return Err(EndpointError::ShutDown);
            }

            let matched = st.registry.borrow().deliver(&topic, &event);
            tracing::trace!(topic = %topic, matched, "published locally");

            if topic.is_status() {
                return Ok(());
            }
            st.peerings
                .values()
                .filter(|e| e.state == PeeringState::Connected && e.interests.wants(&topic))
                .map(|e| e.frame_tx.clone())
                .collect::<Vec<_>>()
        };

        if targets.is_empty() {
            return Ok(());
        }
        let payload = encode_event(&event);
        let bytes = serialize_frame(&Frame::Data { topic, payload })?;
        for tx in &targets {
            let _ = tx.send(bytes.clone());
        }
        Ok(())
    }

    /// Snapshot of every peering this endpoint has, in id order.
    pub fn peerings(&self) -> Vec<PeeringStatus> {
        let st = self.state.borrow();
        let mut all: Vec<PeeringStatus> = st
            .peerings
            .values()
            .map(|e| PeeringStatus {
                id: e.id,
                address: e.address.clone(),
                direction: e.direction,
                state: e.state,
                remote_id: e.remote_id,
                metrics: e.metrics.clone(),
            })
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Stop the endpoint.
    ///
    /// Closes all listening sockets, severs every peering with a goodbye
    /// (transitioning each to `Disconnected`, no retry), waits for their
    /// tasks to finish, then closes every subscription queue so pending
    /// `recv()` calls observe the end of their subscription. Idempotent.
    pub async fn shutdown(&self) {
        let (listener_tasks, peering_tasks, registry) = {
            let mut st = self.state.borrow_mut();
            if st.lifecycle != EndpointLifecycle::Running {
                return;
            }
            st.lifecycle = EndpointLifecycle::ShuttingDown;
            tracing::debug!(endpoint = %st.id, "shutting down endpoint");

            let mut listener_tasks = Vec::new();
            for listener in &mut st.listeners {
                if let Some(tx) = listener.shutdown_tx.take() {
                    let _ = tx.send(());
                }
                if let Some(task) = listener.task.take() {
                    listener_tasks.push(task);
                }
            }
            let mut peering_tasks = Vec::new();
            for entry in st.peerings.values_mut() {
                if let Some(tx) = entry.shutdown_tx.take() {
                    let _ = tx.send("endpoint shutdown".to_string());
                }
                if let Some(task) = entry.task.take() {
                    peering_tasks.push(task);
                }
            }
            (listener_tasks, peering_tasks, st.registry.clone())
        };

        for task in listener_tasks {
            let _ = task.await;
        }
        for task in peering_tasks {
            let _ = task.await;
        }

        registry.borrow_mut().close_all();
        self.state.borrow_mut().lifecycle = EndpointLifecycle::Stopped;
    }
}

impl<P: Providers> Drop for Endpoint<P> {
    fn drop(&mut self) {
        // Best-effort teardown when shutdown() was skipped. Signals tasks
        // and ends subscriptions without waiting for anything.
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return;
        };
        if st.lifecycle == EndpointLifecycle::Stopped {
            return;
        }
        for listener in &mut st.listeners {
            if let Some(tx) = listener.shutdown_tx.take() {
                let _ = tx.send(());
            }
        }
        for entry in st.peerings.values_mut() {
            if let Some(tx) = entry.shutdown_tx.take() {
                let _ = tx.send("endpoint dropped".to_string());
            }
        }
        st.registry.borrow_mut().close_all();
        st.lifecycle = EndpointLifecycle::Stopped;
    }
}

impl<P: Providers> std::fmt::Debug for Endpoint<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Endpoint")
            .field("id", &st.id)
            .field("lifecycle", &st.lifecycle)
            .field("peerings", &st.peerings.len())
            .finish()
    }
}

/// Mutable endpoint state shared with listener and connection tasks.
pub(crate) struct EndpointState {
    id: EndpointId,
    config: EndpointConfig,
    lifecycle: EndpointLifecycle,
    registry: Rc<RefCell<SubscriptionRegistry>>,
    peerings: HashMap<PeeringId, PeeringEntry>,
    outbound_index: HashMap<(String, u16), PeeringId>,
    next_peering: u64,
    listeners: Vec<ListenerEntry>,
}

struct ListenerEntry {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

struct PeeringEntry {
    id: PeeringId,
    address: String,
    direction: PeeringDirection,
    state: PeeringState,
    remote_id: Option<EndpointId>,
    interests: Interests,
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    shutdown_tx: Option<oneshot::Sender<String>>,
    metrics: PeeringMetrics,
    task: Option<JoinHandle<()>>,
}

/// Outcome of presenting a remote HELLO for admission.
pub(crate) enum Admission {
    /// Peering is now connected; `peer_added` has been synthesized.
    Accepted,
    /// The link must be refused and closed with a goodbye.
    Refused {
        /// Goodbye reason sent to the remote.
        reason: &'static str,
    },
}

impl EndpointState {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.lifecycle != EndpointLifecycle::Running
    }

    /// The HELLO this endpoint presents during handshakes.
    pub(crate) fn hello_frame(&self) -> Frame {
        Frame::Hello {
            version: PROTOCOL_VERSION,
            id: self.id,
            interests: self.local_interests(),
        }
    }

    fn local_interests(&self) -> Interests {
        if self.config.advertise_subscriptions {
            Interests::Topics(self.registry.borrow().topics())
        } else {
            Interests::All
        }
    }

    /// Decide whether a handshaken remote may join, refusing self-peerings
    /// and duplicates of an already-connected remote. On acceptance the
    /// peering becomes `Connected` and `peer_added` is synthesized.
    pub(crate) fn admit_remote(
        &mut self,
        peering: PeeringId,
        remote: EndpointId,
        interests: Interests,
    ) -> Admission {
        if remote == self.id {
            return Admission::Refused {
                reason: "self peering",
            };
        }
        let duplicate = self.peerings.iter().any(|(id, entry)| {
            *id != peering
                && entry.state == PeeringState::Connected
                && entry.remote_id == Some(remote)
        });
        if duplicate {
            return Admission::Refused {
                reason: "duplicate peering",
            };
        }
        let Some(entry) = self.peerings.get_mut(&peering) else {
            return Admission::Refused {
                reason: "peering closed",
            };
        };

        entry.state = PeeringState::Connected;
        entry.remote_id = Some(remote);
        entry.interests = interests;
        entry.metrics.record_connection_established();
        let address = entry.address.clone();
        tracing::debug!(peering = %peering, remote = %remote, address = %address, "peering established");
        self.emit_status(PEER_ADDED, remote, &address, None);
        Admission::Accepted
    }

    /// Move a peering out of its current state. If it was `Connected`,
    /// synthesize `peer_lost` with the given reason.
    pub(crate) fn demote(&mut self, peering: PeeringId, reason: &str, next: PeeringState) {
        let Some(entry) = self.peerings.get_mut(&peering) else {
            return;
        };
        let was_connected = entry.state == PeeringState::Connected;
        entry.state = next;
        let remote = entry.remote_id;
        let address = entry.address.clone();
        if was_connected {
            if let Some(remote) = remote {
                tracing::debug!(peering = %peering, remote = %remote, reason, next = %next, "peering ended");
                self.emit_status(PEER_LOST, remote, &address, Some(reason));
            }
        }
    }

    /// Return a peering to `Connecting` for another connection attempt.
    pub(crate) fn begin_reconnect(&mut self, peering: PeeringId) {
        if let Some(entry) = self.peerings.get_mut(&peering) {
            entry.state = PeeringState::Connecting;
            entry.remote_id = None;
        }
    }

    pub(crate) fn metrics_mut(&mut self, peering: PeeringId) -> Option<&mut PeeringMetrics> {
        self.peerings.get_mut(&peering).map(|entry| &mut entry.metrics)
    }

    pub(crate) fn update_interests(&mut self, peering: PeeringId, interests: Interests) {
        if let Some(entry) = self.peerings.get_mut(&peering) {
            entry.interests = interests;
        }
    }

    /// Fan a message from a peer out to matching local subscriptions.
    ///
    /// Messages are never relayed to other peerings, and remote messages
    /// claiming the reserved status namespace are discarded: status events
    /// are synthesized locally, never accepted off the wire.
    pub(crate) fn route_inbound(&self, peering: PeeringId, topic: Topic, event: Event) {
        if topic.is_status() {
            tracing::warn!(peering = %peering, topic = %topic, "discarding remote message on reserved status topic");
            return;
        }
        let matched = self.registry.borrow().deliver(&topic, &event);
        tracing::trace!(peering = %peering, topic = %topic, matched, "delivered remote message");
    }

    /// Forget a peering. Every connection task, inbound and outbound, calls
    /// this as it exits, so entries never outlive the task driving them.
    pub(crate) fn remove_peering(&mut self, peering: PeeringId) {
        self.peerings.remove(&peering);
    }

    fn allocate_peering_id(&mut self) -> PeeringId {
        let id = PeeringId::new(self.next_peering);
        self.next_peering += 1;
        id
    }

    fn emit_status(&self, name: &str, remote: EndpointId, address: &str, reason: Option<&str>) {
        let mut args = vec![Value::from(remote.to_string()), Value::from(address)];
        if let Some(reason) = reason {
            args.push(Value::from(reason));
        }
        let event = Event::new(name, args);
        self.registry.borrow().deliver(&Topic::status(), &event);
    }
}

/// Accept inbound connections until told to stop.
async fn accept_loop<P: Providers>(
    providers: P,
    listener: <P::Network as NetworkProvider>::Listener,
    state: Rc<RefCell<EndpointState>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("listener shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!(remote = %addr, "accepted inbound connection");
                        spawn_inbound(&providers, &state, stream, addr.to_string());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

fn spawn_inbound<P: Providers>(
    providers: &P,
    state: &Rc<RefCell<EndpointState>>,
    stream: <P::Network as NetworkProvider>::Stream,
    address: String,
) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let mut st = state.borrow_mut();
    if st.is_shutting_down() {
        return;
    }
    let id = st.allocate_peering_id();
    let task = providers.tasks().spawn_task(
        &format!("peering-in-{id}"),
        run_inbound(
            providers.clone(),
            st.config.peering.clone(),
            id,
            address.clone(),
            stream,
            state.clone(),
            frame_rx,
            shutdown_rx,
        ),
    );
    st.peerings.insert(
        id,
        PeeringEntry {
            id,
            address,
            direction: PeeringDirection::Inbound,
            state: PeeringState::Connecting,
            remote_id: None,
            interests: Interests::All,
            frame_tx,
            shutdown_tx: Some(shutdown_tx),
            metrics: PeeringMetrics::default(),
            task: Some(task),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> Topic {
        Topic::new(s).expect("valid topic")
    }

    #[test]
    fn test_new_endpoint_is_running() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        assert_eq!(endpoint.lifecycle(), EndpointLifecycle::Running);
        assert!(!endpoint.id().is_nil());
        assert!(endpoint.peerings().is_empty());
    }

    #[test]
    fn test_publish_fans_out_to_matching_subscriptions() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let exact = endpoint.subscribe(topic("/test")).expect("subscribe");
        let parent = endpoint.subscribe(topic("/")).expect("subscribe");
        let other = endpoint.subscribe(topic("/testing")).expect("subscribe");

        endpoint
            .publish(topic("/test/unit"), Event::new("hit", vec![]))
            .expect("publish");

        assert_eq!(exact.len(), 1);
        assert_eq!(parent.len(), 1);
        assert_eq!(other.len(), 0);
    }

    #[test]
    fn test_publish_preserves_local_order() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let sub = endpoint.subscribe(topic("/seq")).expect("subscribe");

        for i in 0..6i64 {
            endpoint
                .publish(topic("/seq"), Event::new("n", vec![Value::from(i)]))
                .expect("publish");
        }

        for i in 0..6i64 {
            let (_, event) = sub.try_recv().expect("queued");
            assert_eq!(event.args()[0].as_integer().expect("int"), i);
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_status_topic_is_deliverable_locally() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let status = endpoint.subscribe(Topic::status()).expect("subscribe");

        endpoint
            .publish(Topic::status(), Event::new("local_note", vec![]))
            .expect("publish");

        let (t, event) = status.try_recv().expect("delivered");
        assert!(t.is_status());
        assert_eq!(event.name(), &"local_note");
    }

    #[test]
    fn test_subscribe_uses_configured_queue_policy() {
        let config = EndpointConfig {
            queue_policy: QueuePolicy::DropOldest(1),
            ..EndpointConfig::default()
        };
        let endpoint = Endpoint::new(config);
        let sub = endpoint.subscribe(topic("/t")).expect("subscribe");

        endpoint
            .publish(topic("/t"), Event::new("a", vec![]))
            .expect("publish");
        endpoint
            .publish(topic("/t"), Event::new("b", vec![]))
            .expect("publish");

        assert_eq!(sub.len(), 1);
        assert_eq!(sub.dropped(), 1);
        let (_, event) = sub.try_recv().expect("queued");
        assert_eq!(event.name(), &"b");
    }

    #[test]
    fn test_unpeer_without_peering_is_false() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        assert!(!endpoint.unpeer("127.0.0.1", 1));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_further_operations() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let sub = endpoint.subscribe(topic("/t")).expect("subscribe");

        endpoint.shutdown().await;
        assert_eq!(endpoint.lifecycle(), EndpointLifecycle::Stopped);

        assert!(matches!(
            endpoint.publish(topic("/t"), Event::new("x", vec![])),
            Err(EndpointError::ShutDown)
        ));
        assert!(matches!(
            endpoint.subscribe(topic("/t")),
            Err(EndpointError::ShutDown)
        ));
        assert!(matches!(
            endpoint.peer("127.0.0.1", 1),
            Err(EndpointError::ShutDown)
        ));
        assert!(matches!(
            endpoint.listen("127.0.0.1", 0).await,
            Err(EndpointError::ShutDown)
        ));

        // Existing subscriptions observe the end of their stream.
        assert!(sub.is_closed());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        endpoint.shutdown().await;
        endpoint.shutdown().await;
        assert_eq!(endpoint.lifecycle(), EndpointLifecycle::Stopped);
    }

    #[test]
    fn test_admit_refuses_self_peering() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let local = endpoint.id();
        let mut st = endpoint.state.borrow_mut();
        let id = st.allocate_peering_id();
        assert!(matches!(
            st.admit_remote(id, local, Interests::All),
            Admission::Refused {
                reason: "self peering"
            }
        ));
    }

    #[test]
    fn test_route_inbound_discards_status_namespace() {
        let endpoint = Endpoint::new(EndpointConfig::default());
        let status = endpoint.subscribe(Topic::status()).expect("subscribe");

        let st = endpoint.state.borrow();
        st.route_inbound(
            PeeringId::new(0),
            Topic::status(),
            Event::new("peer_added", vec![]),
        );
        drop(st);

        assert!(status.try_recv().is_none());
    }
}
