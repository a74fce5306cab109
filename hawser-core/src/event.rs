//! Events: named, typed argument lists exchanged between endpoints.
//!
//! An [`Event`] is the unit of publish/subscribe payload. Its arguments are
//! drawn from the closed [`Value`] variant set so that every consumer can
//! match exhaustively, and its textual values are [`Text`] rather than
//! `String`: the wire does not promise valid UTF-8 and neither do we.

use std::borrow::Cow;
use std::fmt;

use crate::codec::DecodeError;

/// Text that is usually UTF-8 but never required to be.
///
/// The codec frames text as length + raw bytes without validating the
/// encoding, so a value produced by a peer may contain arbitrary byte
/// sequences. `Text` preserves them exactly; [`Text::as_str`] is the
/// checked view and [`Text::to_string_lossy`] the forgiving one.
///
/// # Examples
///
/// ```
/// use hawser_core::Text;
///
/// let clean = Text::from("hello");
/// assert_eq!(clean.as_str(), Some("hello"));
///
/// let tail = Text::new(b"x\x82".to_vec());
/// assert_eq!(tail.as_str(), None);
/// assert_eq!(tail.as_bytes(), b"x\x82");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Text(Vec<u8>);

impl Text {
    /// Wrap raw bytes as text.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Borrow as `&str` if the bytes are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Borrow as `&str`, replacing invalid sequences with U+FFFD.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Consume into the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for Text {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Text {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Text {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Text({:?})", self.to_string_lossy())
    }
}

/// Discriminator for the [`Value`] variants, used in type errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A boolean.
    Boolean,
    /// A signed 64-bit integer.
    Integer,
    /// A 64-bit float.
    Float,
    /// Length-framed text bytes.
    Text,
    /// Opaque binary, distinct from text.
    Bytes,
    /// A nested event.
    Event,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// One event argument.
///
/// The set is closed: consumers match exhaustively instead of downcasting.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A boolean.
    Boolean(bool),
    /// A signed 64-bit integer.
    Integer(i64),
    /// A 64-bit float.
    Float(f64),
    /// Text bytes, not necessarily valid UTF-8.
    Text(Text),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// A nested event.
    Event(Event),
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Event(_) => ValueKind::Event,
        }
    }

    /// Extract a boolean, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_boolean(&self) -> Result<bool, DecodeError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }

    /// Extract an integer, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_integer(&self) -> Result<i64, DecodeError> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch(ValueKind::Integer)),
        }
    }

    /// Extract a float, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_float(&self) -> Result<f64, DecodeError> {
        match self {
            Value::Float(x) => Ok(*x),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }

    /// Extract text, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_text(&self) -> Result<&Text, DecodeError> {
        match self {
            Value::Text(t) => Ok(t),
            other => Err(other.mismatch(ValueKind::Text)),
        }
    }

    /// Extract binary data, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_bytes(&self) -> Result<&[u8], DecodeError> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(other.mismatch(ValueKind::Bytes)),
        }
    }

    /// Extract a nested event, or fail with [`DecodeError::TypeMismatch`].
    pub fn as_event(&self) -> Result<&Event, DecodeError> {
        match self {
            Value::Event(e) => Ok(e),
            other => Err(other.mismatch(ValueKind::Event)),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> DecodeError {
        DecodeError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Text::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Text::from(s))
    }
}

impl From<Text> for Value {
    fn from(t: Text) -> Self {
        Value::Text(t)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        Value::Event(event)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(t) => write!(f, "{:?}", t.to_string_lossy()),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Event(e) => write!(f, "{e}"),
        }
    }
}

/// A named, typed, ordered argument list.
///
/// Events are immutable once constructed; they are either built locally from
/// a name and arguments or decoded from wire bytes by the codec. Name and
/// argument sequence fully define equality, so the codec round-trip law is
/// plain `==`.
///
/// # Examples
///
/// ```
/// use hawser_core::{Event, Value};
///
/// let ping = Event::new("ping", vec![Value::from("hi"), Value::from(3i64)]);
/// assert_eq!(ping.name(), &"ping");
/// assert_eq!(ping.args()[1].as_integer().unwrap(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: Text,
    args: Vec<Value>,
}

impl Event {
    /// Build an event from a name and its arguments.
    pub fn new(name: impl Into<Text>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The event name.
    pub fn name(&self) -> &Text {
        &self.name
    }

    /// The ordered argument list.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// A single argument by position.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Consume into name and arguments.
    pub fn into_parts(self) -> (Text, Vec<Value>) {
        (self.name, self.args)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name.to_string_lossy())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_utf8_views() {
        let t = Text::from("hello");
        assert_eq!(t.as_str(), Some("hello"));
        assert_eq!(t.to_string_lossy(), "hello");
        assert_eq!(t, "hello");
    }

    #[test]
    fn test_text_preserves_invalid_utf8() {
        let t = Text::new(b"xXx\x82".to_vec());
        assert_eq!(t.as_str(), None);
        assert_eq!(t.as_bytes(), b"xXx\x82");
        assert_eq!(t.to_string_lossy(), "xXx\u{fffd}");
    }

    #[test]
    fn test_text_equality_is_byte_exact() {
        assert_eq!(Text::from("abc"), Text::new(b"abc".to_vec()));
        assert_ne!(Text::from("abc"), Text::from("abd"));
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Value::from(true).kind(), ValueKind::Boolean);
        assert_eq!(Value::from(1i64).kind(), ValueKind::Integer);
        assert_eq!(Value::from(1.5f64).kind(), ValueKind::Float);
        assert_eq!(Value::from("x").kind(), ValueKind::Text);
        assert_eq!(Value::from(vec![1u8]).kind(), ValueKind::Bytes);
        assert_eq!(
            Value::from(Event::new("e", vec![])).kind(),
            ValueKind::Event
        );
    }

    #[test]
    fn test_typed_accessors() {
        assert_eq!(Value::from(true).as_boolean().expect("bool"), true);
        assert_eq!(Value::from(-7i64).as_integer().expect("int"), -7);
        assert_eq!(Value::from(2.5f64).as_float().expect("float"), 2.5);
        assert_eq!(Value::from("hi").as_text().expect("text"), &"hi");
        assert_eq!(
            Value::from(vec![9u8, 8]).as_bytes().expect("bytes"),
            &[9, 8]
        );
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let err = Value::from(1i64).as_text().expect_err("mismatch");
        assert_eq!(
            err,
            DecodeError::TypeMismatch {
                expected: ValueKind::Text,
                found: ValueKind::Integer,
            }
        );
        assert!(Value::from("x").as_integer().is_err());
        assert!(Value::from(true).as_event().is_err());
    }

    #[test]
    fn test_event_accessors() {
        let e = Event::new("ping", vec![Value::from("a"), Value::from(1i64)]);
        assert_eq!(e.name(), &"ping");
        assert_eq!(e.args().len(), 2);
        assert!(e.arg(2).is_none());
        let (name, args) = e.into_parts();
        assert_eq!(name, "ping");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_event_display() {
        let e = Event::new("ping", vec![Value::from("hi"), Value::from(3i64)]);
        assert_eq!(e.to_string(), "ping(\"hi\", 3)");
        let nested = Event::new("outer", vec![Value::from(e)]);
        assert_eq!(nested.to_string(), "outer(ping(\"hi\", 3))");
    }

    #[test]
    fn test_bytes_display_is_hex() {
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
    }
}
