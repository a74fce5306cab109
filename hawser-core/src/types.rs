//! Core identity types shared by every layer of the stack.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identity of a single endpoint instance.
///
/// Every endpoint draws a random 128-bit identity at startup and announces it
/// during the connection handshake. Identities let peers tell links apart
/// (including the degenerate case of an endpoint dialing itself) without any
/// coordination or central registry.
///
/// The textual form is 32 lowercase hex digits, which is also what the serde
/// representation uses.
///
/// # Examples
///
/// ```
/// use hawser_core::EndpointId;
///
/// let id = EndpointId::from_bytes([0; 16]);
/// assert_eq!(id.to_string(), "00000000000000000000000000000000");
/// assert_eq!(id, "00000000000000000000000000000000".parse().unwrap());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u128);

impl EndpointId {
    /// Draw a fresh random identity.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// The all-zero identity, used as a sentinel before a handshake completes.
    pub const fn nil() -> Self {
        Self(0)
    }

    /// Whether this is the nil sentinel.
    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }

    /// Little-endian byte representation, as carried on the wire.
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// Rebuild an identity from its little-endian byte representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({:032x})", self.0)
    }
}

/// Error returned when parsing an [`EndpointId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid endpoint id: expected 32 hex digits")]
pub struct EndpointIdParseError;

impl FromStr for EndpointId {
    type Err = EndpointIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(EndpointIdParseError);
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| EndpointIdParseError)
    }
}

impl Serialize for EndpointId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EndpointId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
