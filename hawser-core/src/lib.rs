//! # hawser-core
//!
//! Core types for the hawser pub/sub stack.
//!
//! This crate holds everything below the network protocol: the value model,
//! the wire codec for events, topic matching, and the provider traits that
//! abstract the runtime environment.
//!
//! - [`EndpointId`]: 128-bit random endpoint identity
//! - [`Topic`]: hierarchical routing key with segment-aligned prefix matching
//! - [`Event`], [`Value`], [`Text`]: named, typed argument lists
//! - [`encode_event`] / [`decode_event`]: self-describing binary codec
//!
//! ## Provider traits
//!
//! Networking, time and task spawning are reached through traits so tests
//! can substitute their own implementations:
//!
//! - [`NetworkProvider`]: connections and listeners
//! - [`TimeProvider`]: delays and deadlines
//! - [`TaskProvider`]: background task spawning
//! - [`Providers`]: the three bundled behind one type parameter

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod codec;
mod event;
mod network;
mod providers;
mod task;
mod time;
mod topic;
mod types;

// Codec exports
pub use codec::{
    DecodeError, MAX_VALUE_DEPTH, decode_event, decode_value, encode_event, encode_value,
};

// Value model exports
pub use event::{Event, Text, Value, ValueKind};
pub use topic::{Topic, TopicError};
pub use types::{EndpointId, EndpointIdParseError};

// Provider trait exports
pub use network::{NetworkListener, NetworkProvider, TokioNetwork, TokioTcpListener};
pub use providers::{Providers, TokioProviders};
pub use task::{TaskProvider, TokioTasks};
pub use time::{Elapsed, TimeProvider, TokioClock};
