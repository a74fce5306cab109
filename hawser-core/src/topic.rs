//! Hierarchical topics and the prefix-matching rule used for routing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A hierarchical routing key, e.g. `/zeek/events/http`.
///
/// Topics are immutable UTF-8 strings whose segments are separated by `/`.
/// A subscription topic acts as a *segment-aligned* prefix filter: it matches
/// a published topic that is byte-identical, or that continues past the
/// subscription with a `/` segment boundary. See [`Topic::matches`].
///
/// The only structural requirement is that a topic is never empty.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

/// Error returned when constructing a [`Topic`] from invalid input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Topics must contain at least one byte.
    #[error("topic must not be empty")]
    Empty,
}

impl Topic {
    /// Segment separator for hierarchical topics.
    pub const SEPARATOR: char = '/';

    /// Reserved topic on which endpoints deliver locally synthesized
    /// `peer_added` / `peer_lost` notifications.
    ///
    /// Events on this topic are never forwarded to peers; subscribing to it
    /// only ever observes the local endpoint's own view of its links.
    pub const STATUS: &'static str = "/hawser/status";

    /// Build a topic, rejecting empty input.
    pub fn new(name: impl Into<String>) -> Result<Self, TopicError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TopicError::Empty);
        }
        Ok(Self(name))
    }

    /// The reserved lifecycle topic ([`Topic::STATUS`]).
    pub fn status() -> Self {
        Self(Self::STATUS.to_string())
    }

    /// Whether this topic falls under the reserved lifecycle namespace.
    pub fn is_status(&self) -> bool {
        self.0 == Self::STATUS
            || (self.0.len() > Self::STATUS.len()
                && self.0.starts_with(Self::STATUS)
                && self.0.as_bytes()[Self::STATUS.len()] == b'/')
    }

    /// Whether a published topic is relevant to this subscription topic.
    ///
    /// `sub.matches(published)` holds iff `published` equals `sub` exactly or
    /// starts with `sub` immediately followed by `/`. Matching is
    /// case-sensitive and byte-exact; in particular a subscription to
    /// `/test` does *not* match `/testing`.
    ///
    /// # Examples
    ///
    /// ```
    /// use hawser_core::Topic;
    ///
    /// let sub = Topic::new("/test").unwrap();
    /// assert!(sub.matches(&Topic::new("/test").unwrap()));
    /// assert!(sub.matches(&Topic::new("/test/sub").unwrap()));
    /// assert!(!sub.matches(&Topic::new("/testing").unwrap()));
    /// ```
    pub fn matches(&self, published: &Topic) -> bool {
        let sub = self.0.as_bytes();
        let topic = published.0.as_bytes();
        if topic == sub {
            return true;
        }
        topic.len() > sub.len() && topic.starts_with(sub) && topic[sub.len()] == b'/'
    }

    /// The topic text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the topic text in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; empty topics cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({:?})", self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Topic {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> String {
        topic.0
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Topic::new(text).map_err(serde::de::Error::custom)
    }
}
