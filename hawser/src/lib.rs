//! Topic-based peer-to-peer publish/subscribe endpoints.
//!
//! Hawser connects processes into a mesh of peered endpoints. An
//! [`Endpoint`] publishes named, typed [`Event`]s on hierarchical
//! [`Topic`]s and subscribes to topic prefixes; messages reach every local
//! subscription whose prefix matches and every connected peer whose
//! advertised interest matches. There is no broker in the middle and no
//! relaying: each message travels at most one hop.
//!
//! # Model
//!
//! - **Topics** are `/`-separated paths. A subscription to `/test` receives
//!   `/test` and `/test/anything`, but not `/testing` — prefixes match on
//!   whole segments.
//! - **Events** carry a closed set of argument types (boolean, integer,
//!   float, text, bytes, nested event) in a self-describing binary
//!   encoding, so peers interoperate by wire format alone.
//! - **Peerings** are managed links: outbound ones retry with exponential
//!   backoff, and every establishment or loss surfaces as a `peer_added` /
//!   `peer_lost` event on the reserved status topic. Status events are
//!   synthesized locally on each side and never cross the wire.
//!
//! # Quick start
//!
//! ```ignore
//! // Run inside a LocalSet on a current-thread runtime.
//! let endpoint = Endpoint::new(EndpointConfig::default());
//! let port = endpoint.listen("127.0.0.1", 0).await?;
//!
//! let remote = Endpoint::new(EndpointConfig::default());
//! remote.peer("127.0.0.1", port)?;
//!
//! let sub = endpoint.subscribe(Topic::new("/test")?)?;
//! remote.publish(Topic::new("/test")?, Event::new("hello", vec![]))?;
//!
//! let (topic, event) = sub.recv().await.unwrap();
//! assert_eq!(event.name(), &"hello");
//! ```
//!
//! The concurrency model is single-threaded async: endpoints spawn their
//! background work with `tokio::task::spawn_local`, so everything must run
//! inside a `tokio::task::LocalSet` on a current-thread runtime. Alternate
//! provider bundles (see [`Providers`]) can swap the network, clock, and
//! spawner out together.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod endpoint;
mod error;
mod peering;
mod subscriber;
mod wire;

// The value model and provider traits, re-exported so applications need
// only this crate.
pub use hawser_core::{
    decode_event, decode_value, encode_event, encode_value, DecodeError, Elapsed, EndpointId,
    EndpointIdParseError, Event, NetworkListener, NetworkProvider, Providers, TaskProvider, Text,
    TimeProvider, TokioClock, TokioNetwork, TokioProviders, TokioTasks, TokioTcpListener, Topic,
    TopicError, Value, ValueKind, MAX_VALUE_DEPTH,
};

// Endpoint surface.
pub use endpoint::{Endpoint, EndpointConfig, EndpointLifecycle, PEER_ADDED, PEER_LOST};
pub use error::EndpointError;

// Peering lifecycle.
pub use peering::{
    ConnectionError, PeeringConfig, PeeringDirection, PeeringId, PeeringMetrics, PeeringState,
    PeeringStatus,
};

// Subscriptions.
pub use subscriber::{QueuePolicy, RecvFuture, Subscriber};

// Wire protocol, public because the collaborator contract is the frame
// format itself: any process speaking it can join the mesh.
pub use wire::{
    deserialize_frame, serialize_frame, try_deserialize_frame, Frame, FrameError, Interests,
    HEADER_SIZE, MAX_FRAME_SIZE, PROTOCOL_VERSION,
};
