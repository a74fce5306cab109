//! Self-describing binary codec for events.
//!
//! Every value is a one-byte type tag followed by its payload:
//!
//! ```text
//! BOOLEAN 0x01: flag:u8 (0x00 or 0x01)
//! INTEGER 0x02: value:i64 (little-endian)
//! FLOAT   0x03: bits:f64  (little-endian)
//! TEXT    0x04: len:u32 (little-endian) + raw bytes
//! BYTES   0x05: len:u32 (little-endian) + raw bytes
//! EVENT   0x06: name_len:u32 + name bytes + argc:u32 + argc tagged values
//! ```
//!
//! The format is self-describing: a decoder needs no external schema, and an
//! event nests inside another event like any other value. Text payloads are
//! framed as length + bytes and never validated, so byte sequences that are
//! not UTF-8 survive a round-trip unchanged.
//!
//! Decoding rejects anything it does not understand: short input, unknown
//! tags, a boolean byte other than 0 or 1, unconsumed trailing bytes, and
//! nesting deeper than [`MAX_VALUE_DEPTH`] (a flat cap so hostile input
//! cannot exhaust the decoder's stack).

use crate::event::{Event, Text, Value, ValueKind};

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_EVENT: u8 = 0x06;

/// Maximum nesting depth accepted when decoding values.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Errors produced while decoding values or accessing typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the value it announces.
    #[error("truncated input: need {needed} more byte(s), have {have}")]
    Truncated {
        /// Bytes the current field still requires.
        needed: usize,
        /// Bytes actually remaining.
        have: usize,
    },

    /// The type discriminator is not one this codec defines.
    #[error("unknown type tag {tag:#04x}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
    },

    /// A typed access saw a different kind than it expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The kind the caller asked for.
        expected: ValueKind,
        /// The kind actually present.
        found: ValueKind,
    },

    /// A complete value was decoded but bytes remain after it.
    #[error("trailing bytes after value: {remaining} byte(s) unconsumed")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// A boolean payload byte was neither 0 nor 1.
    #[error("invalid boolean byte {value:#04x}")]
    InvalidBool {
        /// The offending byte.
        value: u8,
    },

    /// Values nest deeper than [`MAX_VALUE_DEPTH`].
    #[error("value nesting exceeds {limit} levels")]
    NestedTooDeeply {
        /// The enforced depth limit.
        limit: usize,
    },
}

/// Encode an event into its wire bytes.
///
/// Encoding cannot fail: every constructible [`Event`] is representable.
///
/// # Examples
///
/// ```
/// use hawser_core::{decode_event, encode_event, Event, Value};
///
/// let event = Event::new("ping", vec![Value::from("hi"), Value::from(0i64)]);
/// let bytes = encode_event(&event);
/// assert_eq!(decode_event(&bytes).unwrap(), event);
/// ```
pub fn encode_event(event: &Event) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + event.name().len());
    write_event(&mut out, event);
    out
}

/// Encode a single value into its wire bytes.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

/// Decode an event from wire bytes, consuming the whole buffer.
///
/// # Errors
///
/// - [`DecodeError::TypeMismatch`] if the top-level value is not an event
/// - [`DecodeError::TrailingBytes`] if bytes remain after the event
/// - any error of [`decode_value`]
pub fn decode_event(bytes: &[u8]) -> Result<Event, DecodeError> {
    match decode_value(bytes)? {
        Value::Event(event) => Ok(event),
        other => Err(DecodeError::TypeMismatch {
            expected: ValueKind::Event,
            found: other.kind(),
        }),
    }
}

/// Decode a single value from wire bytes, consuming the whole buffer.
///
/// # Errors
///
/// - [`DecodeError::Truncated`] if the input ends early
/// - [`DecodeError::UnknownTag`] on an unrecognized discriminator
/// - [`DecodeError::InvalidBool`] on a malformed boolean payload
/// - [`DecodeError::TrailingBytes`] if bytes remain after the value
/// - [`DecodeError::NestedTooDeeply`] past [`MAX_VALUE_DEPTH`]
pub fn decode_value(bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = Reader::new(bytes);
    let value = read_value(&mut reader, 0)?;
    let remaining = reader.remaining();
    if remaining > 0 {
        return Err(DecodeError::TrailingBytes { remaining });
    }
    Ok(value)
}

fn write_event(out: &mut Vec<u8>, event: &Event) {
    out.push(TAG_EVENT);
    write_len_prefixed(out, event.name().as_bytes());
    out.extend_from_slice(&(event.args().len() as u32).to_le_bytes());
    for arg in event.args() {
        write_value(out, arg);
    }
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Boolean(b) => {
            out.push(TAG_BOOLEAN);
            out.push(u8::from(*b));
        }
        Value::Integer(i) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(x) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&x.to_le_bytes());
        }
        Value::Text(t) => {
            out.push(TAG_TEXT);
            write_len_prefixed(out, t.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            write_len_prefixed(out, b);
        }
        Value::Event(e) => write_event(out, e),
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_value(reader: &mut Reader<'_>, depth: usize) -> Result<Value, DecodeError> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(DecodeError::NestedTooDeeply {
            limit: MAX_VALUE_DEPTH,
        });
    }

    let tag = reader.take_u8()?;
    match tag {
        TAG_BOOLEAN => match reader.take_u8()? {
            0 => Ok(Value::Boolean(false)),
            1 => Ok(Value::Boolean(true)),
            value => Err(DecodeError::InvalidBool { value }),
        },
        TAG_INTEGER => Ok(Value::Integer(i64::from_le_bytes(reader.take_array()?))),
        TAG_FLOAT => Ok(Value::Float(f64::from_le_bytes(reader.take_array()?))),
        TAG_TEXT => {
            let bytes = reader.take_len_prefixed()?;
            Ok(Value::Text(Text::new(bytes.to_vec())))
        }
        TAG_BYTES => {
            let bytes = reader.take_len_prefixed()?;
            Ok(Value::Bytes(bytes.to_vec()))
        }
        TAG_EVENT => {
            let name = Text::new(reader.take_len_prefixed()?.to_vec());
            let argc = reader.take_u32()? as usize;
            let mut args = Vec::with_capacity(argc.min(64));
            for _ in 0..argc {
                args.push(read_value(reader, depth + 1)?);
            }
            Ok(Value::Event(Event::new(name, args)))
        }
        tag => Err(DecodeError::UnknownTag { tag }),
    }
}

/// Cursor over the input buffer; every take checks remaining length first.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < count {
            return Err(DecodeError::Truncated {
                needed: count,
                have: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.take(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn take_len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(event: Event) {
        let bytes = encode_event(&event);
        let decoded = decode_event(&bytes).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_roundtrip_empty_event() {
        roundtrip(Event::new("", vec![]));
        roundtrip(Event::new("tick", vec![]));
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(Event::new(
            "scalars",
            vec![
                Value::from(true),
                Value::from(false),
                Value::from(0i64),
                Value::from(-1i64),
                Value::from(i64::MIN),
                Value::from(i64::MAX),
                Value::from(0.0f64),
                Value::from(-2.75f64),
                Value::from(f64::MAX),
            ],
        ));
    }

    #[test]
    fn test_roundtrip_text_and_bytes() {
        roundtrip(Event::new(
            "strings",
            vec![
                Value::from(""),
                Value::from("hello world"),
                Value::Bytes(vec![]),
                Value::Bytes(vec![0x00, 0xff, 0x7f]),
            ],
        ));
    }

    #[test]
    fn test_roundtrip_preserves_invalid_utf8_text() {
        // A text argument ending in a stray continuation byte must come back
        // byte-for-byte, not be rejected or replaced.
        let event = Event::new("ping", vec![Value::Text(Text::new(b"xXxXx\x82".to_vec()))]);
        let bytes = encode_event(&event);
        let decoded = decode_event(&bytes).expect("decode");
        assert_eq!(decoded, event);
        let arg = decoded.args()[0].as_text().expect("text");
        assert_eq!(arg.as_bytes(), b"xXxXx\x82");
        assert_eq!(arg.as_str(), None);
    }

    #[test]
    fn test_roundtrip_nested_events() {
        let inner = Event::new("inner", vec![Value::from(1i64)]);
        let middle = Event::new("middle", vec![Value::from(inner), Value::from("x")]);
        roundtrip(Event::new("outer", vec![Value::from(middle)]));
    }

    #[test]
    fn test_text_and_bytes_are_distinct_kinds() {
        let text = encode_value(&Value::from("ab"));
        let bytes = encode_value(&Value::Bytes(b"ab".to_vec()));
        assert_ne!(text, bytes);
        assert_eq!(decode_value(&text).expect("text").kind(), ValueKind::Text);
        assert_eq!(
            decode_value(&bytes).expect("bytes").kind(),
            ValueKind::Bytes
        );
    }

    #[test]
    fn test_decode_truncated_at_every_prefix() {
        let event = Event::new(
            "sample",
            vec![Value::from("text"), Value::from(42i64), Value::from(true)],
        );
        let bytes = encode_event(&event);
        for len in 0..bytes.len() {
            let result = decode_event(&bytes[..len]);
            assert!(
                matches!(result, Err(DecodeError::Truncated { .. })),
                "prefix of {len} bytes should be truncated, got {result:?}"
            );
        }
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(
            decode_value(&[0x00]),
            Err(DecodeError::UnknownTag { tag: 0x00 })
        );
        assert_eq!(
            decode_value(&[0x07]),
            Err(DecodeError::UnknownTag { tag: 0x07 })
        );
        assert_eq!(
            decode_value(&[0xff]),
            Err(DecodeError::UnknownTag { tag: 0xff })
        );
    }

    #[test]
    fn test_decode_invalid_bool_byte() {
        assert_eq!(
            decode_value(&[TAG_BOOLEAN, 0x02]),
            Err(DecodeError::InvalidBool { value: 0x02 })
        );
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = encode_event(&Event::new("e", vec![]));
        bytes.push(0xaa);
        assert_eq!(
            decode_event(&bytes),
            Err(DecodeError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn test_decode_event_rejects_non_event() {
        let bytes = encode_value(&Value::from(3i64));
        assert_eq!(
            decode_event(&bytes),
            Err(DecodeError::TypeMismatch {
                expected: ValueKind::Event,
                found: ValueKind::Integer,
            })
        );
    }

    #[test]
    fn test_decode_argc_larger_than_input() {
        // Event announcing three arguments but carrying none.
        let mut bytes = vec![TAG_EVENT];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'e');
        bytes.extend_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            decode_event(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_depth_limit() {
        // MAX_VALUE_DEPTH nested event headers, innermost left truncated so
        // the depth check has to fire before any payload is needed.
        let mut bytes = Vec::new();
        for _ in 0..=MAX_VALUE_DEPTH {
            bytes.push(TAG_EVENT);
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&1u32.to_le_bytes());
        }
        assert_eq!(
            decode_event(&bytes),
            Err(DecodeError::NestedTooDeeply {
                limit: MAX_VALUE_DEPTH
            })
        );
    }

    #[test]
    fn test_float_bit_patterns_survive() {
        for x in [f64::MIN_POSITIVE, f64::EPSILON, -0.0, 1.0 / 3.0] {
            let decoded = decode_value(&encode_value(&Value::from(x))).expect("decode");
            assert_eq!(
                decoded.as_float().expect("float").to_bits(),
                x.to_bits(),
                "bits changed for {x}"
            );
        }
    }

    #[test]
    fn test_encoding_is_stable() {
        // The byte layout is a wire contract shared with independently
        // implemented peers; lock the exact bytes of a small sample.
        let event = Event::new("hi", vec![Value::from(true)]);
        let expected = [
            TAG_EVENT, 2, 0, 0, 0, b'h', b'i', 1, 0, 0, 0, TAG_BOOLEAN, 1,
        ];
        assert_eq!(encode_event(&event), expected);
    }
}
