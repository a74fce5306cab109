//! Frame format for peer links.
//!
//! Every frame on a link is `[length:4][checksum:4][kind:1][body:N]`:
//!
//! - **length**: size of kind + body in bytes (little-endian u32)
//! - **checksum**: CRC32C of kind + body
//! - **kind**: frame discriminator, see [`Frame`]
//! - **body**: kind-specific payload
//!
//! Frame kinds:
//!
//! - `HELLO` (0x01): protocol version, endpoint identity, and the sender's
//!   topic interests; exchanged once right after the transport comes up
//! - `DATA` (0x02): a published topic plus codec-encoded event bytes
//! - `INTEREST` (0x03): a re-advertisement of the sender's interests
//! - `BYE` (0x04): best-effort goodbye with a human-readable reason
//!
//! A buffer holding only part of a frame is not an error — readers call
//! [`try_deserialize_frame`] and wait for more bytes. Checksum failures,
//! oversized lengths and malformed bodies are protocol errors that tear the
//! link down.

use hawser_core::{EndpointId, Topic};

/// Protocol version announced in `HELLO`; peers refuse to talk across
/// versions.
pub const PROTOCOL_VERSION: u16 = 1;

/// Header size: 4 (length) + 4 (checksum) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Maximum size of kind + body (1MB).
///
/// Larger frames are rejected so a peer cannot make us buffer unbounded
/// amounts of data.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const KIND_HELLO: u8 = 0x01;
const KIND_DATA: u8 = 0x02;
const KIND_INTEREST: u8 = 0x03;
const KIND_BYE: u8 = 0x04;

const FLAG_INTERESTS_ALL: u8 = 0x00;
const FLAG_INTERESTS_TOPICS: u8 = 0x01;

/// Frame parsing and serialization errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// Not enough data for a complete frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required for the complete frame.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },

    /// Checksum verification failed.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over kind + body.
        actual: u32,
    },

    /// Frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge {
        /// Announced or actual kind + body size.
        size: usize,
    },

    /// Length field cannot be valid (a frame has at least a kind byte).
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The length value from the header.
        length: u32,
    },

    /// Frame discriminator is not one this protocol defines.
    #[error("unknown frame kind {kind:#04x}")]
    UnknownKind {
        /// The unrecognized kind byte.
        kind: u8,
    },

    /// The body does not parse under its kind's layout.
    #[error("malformed {kind} frame: {details}")]
    Malformed {
        /// Human-readable frame kind name.
        kind: &'static str,
        /// What was wrong.
        details: String,
    },
}

/// Topics a peer wants to receive, as advertised in `HELLO` / `INTEREST`.
///
/// This is an advisory send-side filter: a peer advertising explicit topics
/// may still briefly receive non-matching frames around a re-advertisement,
/// and the receiving side routes by its own subscriptions regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interests {
    /// Relay everything (the default).
    All,
    /// Relay only topics matched by one of these subscription prefixes.
    Topics(Vec<Topic>),
}

impl Interests {
    /// Whether a published topic should be relayed to a peer with these
    /// interests.
    pub fn wants(&self, topic: &Topic) -> bool {
        match self {
            Interests::All => true,
            Interests::Topics(subs) => subs.iter().any(|sub| sub.matches(topic)),
        }
    }
}

/// One frame on a peer link.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Handshake: identity and interest advertisement.
    Hello {
        /// Sender's protocol version.
        version: u16,
        /// Sender's endpoint identity.
        id: EndpointId,
        /// Sender's initial topic interests.
        interests: Interests,
    },
    /// A published message.
    Data {
        /// Topic the message was published under.
        topic: Topic,
        /// Codec-encoded event bytes.
        payload: Vec<u8>,
    },
    /// Updated interest advertisement.
    Interest {
        /// Sender's current topic interests.
        interests: Interests,
    },
    /// Deliberate goodbye before closing the transport.
    Bye {
        /// Why the sender is leaving.
        reason: String,
    },
}

impl Frame {
    fn kind_byte(&self) -> u8 {
        match self {
            Frame::Hello { .. } => KIND_HELLO,
            Frame::Data { .. } => KIND_DATA,
            Frame::Interest { .. } => KIND_INTEREST,
            Frame::Bye { .. } => KIND_BYE,
        }
    }
}

/// Serialize a frame into header + kind + body bytes.
///
/// # Errors
///
/// Returns [`FrameError::FrameTooLarge`] if kind + body would exceed
/// [`MAX_FRAME_SIZE`].
pub fn serialize_frame(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    let mut out = vec![0u8; HEADER_SIZE];
    out.push(frame.kind_byte());

    match frame {
        Frame::Hello {
            version,
            id,
            interests,
        } => {
            out.extend_from_slice(&version.to_le_bytes());
            out.extend_from_slice(&id.to_bytes());
            write_interests(&mut out, interests);
        }
        Frame::Data { topic, payload } => {
            write_len_prefixed(&mut out, topic.as_str().as_bytes());
            write_len_prefixed(&mut out, payload);
        }
        Frame::Interest { interests } => write_interests(&mut out, interests),
        Frame::Bye { reason } => write_len_prefixed(&mut out, reason.as_bytes()),
    }

    let length = out.len() - HEADER_SIZE;
    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge { size: length });
    }

    let checksum = crc32c::crc32c(&out[HEADER_SIZE..]);
    out[0..4].copy_from_slice(&(length as u32).to_le_bytes());
    out[4..8].copy_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

/// Deserialize one frame from the start of `data`.
///
/// Returns the frame and the number of bytes consumed.
///
/// # Errors
///
/// - [`FrameError::InsufficientData`]: buffer shorter than the frame
/// - [`FrameError::ChecksumMismatch`]: corruption in transit
/// - [`FrameError::InvalidLength`] / [`FrameError::FrameTooLarge`]: bad
///   length field
/// - [`FrameError::UnknownKind`] / [`FrameError::Malformed`]: undecodable
///   content
pub fn deserialize_frame(data: &[u8]) -> Result<(Frame, usize), FrameError> {
    if data.len() < HEADER_SIZE {
        return Err(FrameError::InsufficientData {
            needed: HEADER_SIZE,
            have: data.len(),
        });
    }

    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let expected_checksum = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    if length == 0 {
        return Err(FrameError::InvalidLength { length });
    }
    if length as usize > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: length as usize,
        });
    }

    let total = HEADER_SIZE + length as usize;
    if data.len() < total {
        return Err(FrameError::InsufficientData {
            needed: total,
            have: data.len(),
        });
    }

    let actual_checksum = crc32c::crc32c(&data[HEADER_SIZE..total]);
    if actual_checksum != expected_checksum {
        return Err(FrameError::ChecksumMismatch {
            expected: expected_checksum,
            actual: actual_checksum,
        });
    }

    let kind = data[HEADER_SIZE];
    let body = &data[HEADER_SIZE + 1..total];
    let frame = parse_body(kind, body)?;
    Ok((frame, total))
}

/// Try to deserialize from a buffer that may hold a partial frame.
///
/// - `Ok(Some((frame, consumed)))` if a complete frame was parsed
/// - `Ok(None)` if more bytes are needed (not an error)
/// - `Err` if the data is malformed
pub fn try_deserialize_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    match deserialize_frame(data) {
        Ok(parsed) => Ok(Some(parsed)),
        // Header and payload shortage both mean "wait for more bytes"; body
        // parse errors never use this variant.
        Err(FrameError::InsufficientData { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn write_interests(out: &mut Vec<u8>, interests: &Interests) {
    match interests {
        Interests::All => out.push(FLAG_INTERESTS_ALL),
        Interests::Topics(topics) => {
            out.push(FLAG_INTERESTS_TOPICS);
            out.extend_from_slice(&(topics.len() as u32).to_le_bytes());
            for topic in topics {
                write_len_prefixed(out, topic.as_str().as_bytes());
            }
        }
    }
}

fn parse_body(kind: u8, body: &[u8]) -> Result<Frame, FrameError> {
    match kind {
        KIND_HELLO => {
            let mut reader = BodyReader::new("HELLO", body);
            let version = u16::from_le_bytes(reader.take_array()?);
            let id = EndpointId::from_bytes(reader.take_array()?);
            let interests = reader.take_interests()?;
            reader.finish()?;
            Ok(Frame::Hello {
                version,
                id,
                interests,
            })
        }
        KIND_DATA => {
            let mut reader = BodyReader::new("DATA", body);
            let topic = reader.take_topic()?;
            let payload = reader.take_len_prefixed()?.to_vec();
            reader.finish()?;
            Ok(Frame::Data { topic, payload })
        }
        KIND_INTEREST => {
            let mut reader = BodyReader::new("INTEREST", body);
            let interests = reader.take_interests()?;
            reader.finish()?;
            Ok(Frame::Interest { interests })
        }
        KIND_BYE => {
            let mut reader = BodyReader::new("BYE", body);
            let reason = String::from_utf8_lossy(reader.take_len_prefixed()?).into_owned();
            reader.finish()?;
            Ok(Frame::Bye { reason })
        }
        kind => Err(FrameError::UnknownKind { kind }),
    }
}

/// Cursor over a frame body. The frame length already promised all the
/// bytes, so running short here is [`FrameError::Malformed`], not a request
/// for more data.
struct BodyReader<'a> {
    kind: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        Self { kind, buf, pos: 0 }
    }

    fn malformed(&self, details: impl Into<String>) -> FrameError {
        FrameError::Malformed {
            kind: self.kind,
            details: details.into(),
        }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], FrameError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < count {
            return Err(self.malformed(format!("body ends {} byte(s) early", count - remaining)));
        }
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let slice = self.take(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn take_len_prefixed(&mut self) -> Result<&'a [u8], FrameError> {
        let len = u32::from_le_bytes(self.take_array()?) as usize;
        self.take(len)
    }

    fn take_topic(&mut self) -> Result<Topic, FrameError> {
        let bytes = self.take_len_prefixed()?;
        let text = std::str::from_utf8(bytes)
            .map_err(|_| self.malformed("topic is not valid UTF-8"))?;
        Topic::new(text).map_err(|e| self.malformed(e.to_string()))
    }

    fn take_interests(&mut self) -> Result<Interests, FrameError> {
        match self.take(1)?[0] {
            FLAG_INTERESTS_ALL => Ok(Interests::All),
            FLAG_INTERESTS_TOPICS => {
                let count = u32::from_le_bytes(self.take_array()?) as usize;
                let mut topics = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    topics.push(self.take_topic()?);
                }
                Ok(Interests::Topics(topics))
            }
            flag => Err(self.malformed(format!("unknown interests flag {flag:#04x}"))),
        }
    }

    fn finish(&self) -> Result<(), FrameError> {
        let remaining = self.buf.len() - self.pos;
        if remaining > 0 {
            return Err(self.malformed(format!("{remaining} trailing byte(s)")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawser_core::{encode_event, Event, Value};

    fn topic(s: &str) -> Topic {
        Topic::new(s).expect("valid topic")
    }

    fn roundtrip(frame: Frame) {
        let bytes = serialize_frame(&frame).expect("serialize");
        let (decoded, consumed) = deserialize_frame(&bytes).expect("deserialize");
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_hello_roundtrip() {
        roundtrip(Frame::Hello {
            version: PROTOCOL_VERSION,
            id: EndpointId::random(),
            interests: Interests::All,
        });
        roundtrip(Frame::Hello {
            version: 7,
            id: EndpointId::random(),
            interests: Interests::Topics(vec![topic("/test"), topic("/zeek/events")]),
        });
    }

    #[test]
    fn test_data_roundtrip() {
        let payload = encode_event(&Event::new("ping", vec![Value::from(1i64)]));
        roundtrip(Frame::Data {
            topic: topic("/test"),
            payload,
        });
        roundtrip(Frame::Data {
            topic: topic("/test"),
            payload: vec![],
        });
    }

    #[test]
    fn test_interest_and_bye_roundtrip() {
        roundtrip(Frame::Interest {
            interests: Interests::Topics(vec![]),
        });
        roundtrip(Frame::Bye {
            reason: "endpoint shutdown".to_string(),
        });
        roundtrip(Frame::Bye {
            reason: String::new(),
        });
    }

    #[test]
    fn test_length_field_counts_kind_and_body() {
        let bytes = serialize_frame(&Frame::Bye {
            reason: "x".to_string(),
        })
        .expect("serialize");
        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(length as usize, bytes.len() - HEADER_SIZE);
        assert_eq!(bytes[HEADER_SIZE], 0x04);
    }

    #[test]
    fn test_partial_buffers_need_more_data() {
        let bytes = serialize_frame(&Frame::Data {
            topic: topic("/test"),
            payload: b"payload".to_vec(),
        })
        .expect("serialize");

        for cut in [0, 1, HEADER_SIZE - 1, HEADER_SIZE, bytes.len() - 1] {
            let result = try_deserialize_frame(&bytes[..cut]).expect("partial is not an error");
            assert!(result.is_none(), "cut at {cut} should need more data");
        }

        let complete = try_deserialize_frame(&bytes).expect("complete");
        assert!(complete.is_some());
    }

    #[test]
    fn test_extra_data_after_frame_is_left_unconsumed() {
        let mut bytes = serialize_frame(&Frame::Bye {
            reason: "bye".to_string(),
        })
        .expect("serialize");
        let frame_len = bytes.len();
        bytes.extend_from_slice(b"next frame bytes");

        let (frame, consumed) = deserialize_frame(&bytes).expect("deserialize");
        assert_eq!(consumed, frame_len);
        assert!(matches!(frame, Frame::Bye { .. }));
    }

    #[test]
    fn test_checksum_mismatch_on_corruption() {
        let mut bytes = serialize_frame(&Frame::Data {
            topic: topic("/test"),
            payload: b"payload".to_vec(),
        })
        .expect("serialize");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            deserialize_frame(&bytes),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            deserialize_frame(&bytes),
            Err(FrameError::InvalidLength { length: 0 })
        );
    }

    #[test]
    fn test_oversized_length_rejected_before_buffering() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes());
        // Only the header has arrived; the length alone is enough to refuse.
        assert!(matches!(
            deserialize_frame(&bytes),
            Err(FrameError::FrameTooLarge { .. })
        ));
        assert!(try_deserialize_frame(&bytes).is_err());
    }

    #[test]
    fn test_serialize_oversized_frame_rejected() {
        let result = serialize_frame(&Frame::Data {
            topic: topic("/test"),
            payload: vec![0u8; MAX_FRAME_SIZE],
        });
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let body = [0xabu8];
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes.extend_from_slice(&body);
        bytes[0..4].copy_from_slice(&(body.len() as u32).to_le_bytes());
        let checksum = crc32c::crc32c(&body);
        bytes[4..8].copy_from_slice(&checksum.to_le_bytes());
        assert_eq!(
            deserialize_frame(&bytes),
            Err(FrameError::UnknownKind { kind: 0xab })
        );
    }

    #[test]
    fn test_malformed_bodies_rejected() {
        // DATA frame with an empty topic.
        let mut body = vec![KIND_DATA];
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            deserialize_frame(&frame_with_body(&body)),
            Err(FrameError::Malformed { kind: "DATA", .. })
        ));

        // HELLO frame cut short inside the identity.
        let mut body = vec![KIND_HELLO];
        body.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        body.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            deserialize_frame(&frame_with_body(&body)),
            Err(FrameError::Malformed { kind: "HELLO", .. })
        ));

        // BYE frame with trailing garbage after the reason.
        let mut body = vec![KIND_BYE];
        body.extend_from_slice(&1u32.to_le_bytes());
        body.push(b'x');
        body.push(0xee);
        assert!(matches!(
            deserialize_frame(&frame_with_body(&body)),
            Err(FrameError::Malformed { kind: "BYE", .. })
        ));
    }

    #[test]
    fn test_interests_matching() {
        let all = Interests::All;
        assert!(all.wants(&topic("/anything")));

        let some = Interests::Topics(vec![topic("/test"), topic("/other")]);
        assert!(some.wants(&topic("/test")));
        assert!(some.wants(&topic("/test/sub")));
        assert!(!some.wants(&topic("/testing")));
        assert!(!some.wants(&topic("/elsewhere")));

        let none = Interests::Topics(vec![]);
        assert!(!none.wants(&topic("/test")));
    }

    /// Wrap raw kind + body bytes in a valid header.
    fn frame_with_body(kind_and_body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes.extend_from_slice(kind_and_body);
        bytes[0..4].copy_from_slice(&(kind_and_body.len() as u32).to_le_bytes());
        let checksum = crc32c::crc32c(kind_and_body);
        bytes[4..8].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }
}
