//! Binary codec for channel frames.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes. All multi-byte integers are big-endian.
//!
//! Event payloads are JSON, length-prefixed with a u32 so that a frame can be
//! split without parsing the JSON.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::messages::{
    ChannelMessage, DisconnectReason, EventMessage, HelloAckMessage, HelloMessage, MessageType,
    HEADER_SIZE, MAX_PAYLOAD_LEN, PROTOCOL_VERSION,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (bad UTF-8, bad JSON, unknown enum value).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The header declares more payload than the buffer holds.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The payload exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload of {declared} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { declared: usize, max: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ChannelMessage`] into a byte vector including the 24-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] when the encoded payload exceeds
/// [`MAX_PAYLOAD_LEN`], and [`ProtocolError::MalformedPayload`] when an event
/// payload cannot be serialized.
///
/// # Examples
///
/// ```rust
/// use libria_core::protocol::{decode_message, encode_message, ChannelMessage};
///
/// let msg = ChannelMessage::Ping(42);
/// let bytes = encode_message(&msg, 0, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &ChannelMessage,
    sequence_number: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            declared: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`ChannelMessage`] stamped with the current system time.
///
/// # Errors
///
/// See [`encode_message`].
pub fn encode_message_now(
    msg: &ChannelMessage,
    sequence_number: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_message(msg, sequence_number, timestamp_us)
}

/// Validates a frame header and returns the payload length it declares.
///
/// Stream readers call this after reading [`HEADER_SIZE`] bytes to learn how
/// many more bytes belong to the frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the header is short, carries another
/// protocol version, or declares a payload above [`MAX_PAYLOAD_LEN`].
pub fn payload_len_from_header(header: &[u8]) -> Result<usize, ProtocolError> {
    if header.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: header.len(),
        });
    }
    if header[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header[0]));
    }
    let declared = read_u32(header, 4)? as usize;
    if declared > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            declared,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(declared)
}

/// Decodes one [`ChannelMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(ChannelMessage, usize), ProtocolError> {
    let payload_len = payload_len_from_header(bytes)?;

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved and ignored on decode

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    let msg = decode_payload(msg_type, payload)?;
    Ok((msg, total_needed))
}

/// Checks that `msg` fits in one frame without building the frame.
///
/// Senders call this before queueing so an oversized message is refused at
/// the call site instead of being dropped later by the writer task.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] or
/// [`ProtocolError::MalformedPayload`], exactly as [`encode_message`] would.
pub fn validate_message(msg: &ChannelMessage) -> Result<(), ProtocolError> {
    let payload_len = match msg {
        ChannelMessage::Hello(m) => 16 + 1 + prefixed_string_len(&m.label, "Hello.label")?,
        ChannelMessage::Event(m) => {
            let mut json = ByteCounter::default();
            serde_json::to_writer(&mut json, &m.payload)
                .map_err(|e| ProtocolError::MalformedPayload(format!("event payload: {e}")))?;
            prefixed_string_len(&m.name, "Event.name")? + 4 + json.0
        }
        // Fixed-size payloads well under the limit.
        _ => return Ok(()),
    };
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            declared: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(())
}

/// Reads the sequence number out of an encoded frame header.
pub fn sequence_from_header(header: &[u8]) -> Result<u64, ProtocolError> {
    read_u64(header, 8)
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &ChannelMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        ChannelMessage::Hello(m) => encode_hello(&mut buf, m)?,
        ChannelMessage::HelloAck(m) => encode_hello_ack(&mut buf, m),
        ChannelMessage::Ping(token) | ChannelMessage::Pong(token) => {
            buf.extend_from_slice(&token.to_be_bytes())
        }
        ChannelMessage::Disconnect { reason } => buf.push(*reason as u8),
        ChannelMessage::Event(m) => encode_event(&mut buf, m)?,
        ChannelMessage::OpenDevtools => {} // empty payload
    }
    Ok(buf)
}

fn encode_hello(buf: &mut Vec<u8>, m: &HelloMessage) -> Result<(), ProtocolError> {
    buf.extend_from_slice(m.surface_id.as_bytes());
    buf.push(m.protocol_version);
    write_length_prefixed_string(buf, &m.label, "Hello.label")
}

fn encode_hello_ack(buf: &mut Vec<u8>, m: &HelloAckMessage) {
    buf.push(if m.accepted { 0x01 } else { 0x00 });
    buf.push(m.reject_reason);
}

fn encode_event(buf: &mut Vec<u8>, m: &EventMessage) -> Result<(), ProtocolError> {
    let json = serde_json::to_vec(&m.payload)
        .map_err(|e| ProtocolError::MalformedPayload(format!("event payload: {e}")))?;
    write_length_prefixed_string(buf, &m.name, "Event.name")?;
    buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(())
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<ChannelMessage, ProtocolError> {
    match msg_type {
        MessageType::Hello => decode_hello(payload).map(ChannelMessage::Hello),
        MessageType::HelloAck => decode_hello_ack(payload).map(ChannelMessage::HelloAck),
        MessageType::Ping => read_u64(payload, 0).map(ChannelMessage::Ping),
        MessageType::Pong => read_u64(payload, 0).map(ChannelMessage::Pong),
        MessageType::Disconnect => {
            require_len(payload, 1, "Disconnect")?;
            let reason = DisconnectReason::try_from(payload[0]).map_err(|_| {
                ProtocolError::MalformedPayload(format!(
                    "unknown disconnect reason: {}",
                    payload[0]
                ))
            })?;
            Ok(ChannelMessage::Disconnect { reason })
        }
        MessageType::Event => decode_event(payload).map(ChannelMessage::Event),
        MessageType::OpenDevtools => Ok(ChannelMessage::OpenDevtools),
    }
}

fn decode_hello(p: &[u8]) -> Result<HelloMessage, ProtocolError> {
    // 16 (uuid) + 1 (proto ver) + 2 (label_len)
    require_len(p, 19, "Hello")?;
    let surface_id = read_uuid(p, 0)?;
    let protocol_version = p[16];
    let (label, _) = read_length_prefixed_string(p, 17)?;
    Ok(HelloMessage {
        surface_id,
        protocol_version,
        label,
    })
}

fn decode_hello_ack(p: &[u8]) -> Result<HelloAckMessage, ProtocolError> {
    require_len(p, 2, "HelloAck")?;
    Ok(HelloAckMessage {
        accepted: p[0] != 0,
        reject_reason: p[1],
    })
}

fn decode_event(p: &[u8]) -> Result<EventMessage, ProtocolError> {
    let (name, name_end) = read_length_prefixed_string(p, 0)?;
    require_len(p, name_end + 4, "Event.payload_len")?;
    let json_len = read_u32(p, name_end)? as usize;
    let start = name_end + 4;
    require_len(p, start + json_len, "Event.payload")?;
    let payload = serde_json::from_slice(&p[start..start + json_len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("event {name}: invalid JSON: {e}")))?;
    Ok(EventMessage { name, payload })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    let bytes = buf
        .get(offset..offset + 4)
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 4,
            available: buf.len(),
        })?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    let bytes = buf
        .get(offset..offset + 8)
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        })?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(raw))
}

fn read_uuid(buf: &[u8], offset: usize) -> Result<Uuid, ProtocolError> {
    let bytes = buf.get(offset..offset + 16).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "need 16 bytes for UUID at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        ))
    })?;
    Uuid::from_slice(bytes).map_err(|e| ProtocolError::MalformedPayload(format!("uuid: {e}")))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(
    buf: &mut Vec<u8>,
    s: &str,
    context: &str,
) -> Result<(), ProtocolError> {
    let len = prefixed_string_len(s, context)? - 2;
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Encoded size of a length-prefixed string; errors when the prefix cannot
/// hold its length.
fn prefixed_string_len(s: &str, context: &str) -> Result<usize, ProtocolError> {
    if s.len() > u16::MAX as usize {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: {} bytes exceeds the {} byte string limit",
            s.len(),
            u16::MAX
        )));
    }
    Ok(2 + s.len())
}

/// `io::Write` sink that only counts bytes.
#[derive(Default)]
struct ByteCounter(usize);

impl std::io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(
    buf: &[u8],
    offset: usize,
) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::reject_reason;
    use serde_json::json;

    fn round_trip(msg: &ChannelMessage) -> ChannelMessage {
        let encoded = encode_message(msg, 0, 0).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        decoded
    }

    #[test]
    fn test_hello_round_trip() {
        let msg = ChannelMessage::Hello(HelloMessage {
            surface_id: Uuid::new_v4(),
            protocol_version: PROTOCOL_VERSION,
            label: "torrent".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_hello_ack_rejection_keeps_reason() {
        let msg = ChannelMessage::HelloAck(HelloAckMessage {
            accepted: false,
            reject_reason: reject_reason::DUPLICATE_SURFACE,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_event_round_trip_preserves_nested_json() {
        // Arrange
        let msg = ChannelMessage::event(
            "error:emit",
            json!({"message": "bad gateway", "detail": {"status": 502, "retry": [1, 2]}}),
        );

        // Act
        let decoded = round_trip(&msg);

        // Assert
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_event_with_null_payload_round_trips() {
        let msg = ChannelMessage::event("app:about", serde_json::Value::Null);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_open_devtools_has_empty_payload() {
        let bytes = encode_message(&ChannelMessage::OpenDevtools, 3, 0).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(round_trip(&ChannelMessage::OpenDevtools), ChannelMessage::OpenDevtools);
    }

    #[test]
    fn test_header_layout() {
        // Arrange / Act
        let bytes = encode_message(&ChannelMessage::Ping(7), 0x0102, 0x0A0B).unwrap();

        // Assert
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], MessageType::Ping as u8);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(payload_len_from_header(&bytes).unwrap(), 8);
        assert_eq!(sequence_from_header(&bytes).unwrap(), 0x0102);
        assert_eq!(read_u64(&bytes, 16).unwrap(), 0x0A0B);
    }

    #[test]
    fn test_decode_short_buffer_is_insufficient_data() {
        let err = decode_message(&[PROTOCOL_VERSION, 0x07]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: 2
            }
        );
    }

    #[test]
    fn test_decode_wrong_version_is_rejected() {
        let mut bytes = encode_message(&ChannelMessage::Ping(1), 0, 0).unwrap();
        bytes[0] = 0x09;
        assert_eq!(decode_message(&bytes).unwrap_err(), ProtocolError::UnsupportedVersion(0x09));
    }

    #[test]
    fn test_decode_unknown_type_is_rejected() {
        let mut bytes = encode_message(&ChannelMessage::Ping(1), 0, 0).unwrap();
        bytes[1] = 0x44;
        assert_eq!(decode_message(&bytes).unwrap_err(), ProtocolError::UnknownMessageType(0x44));
    }

    #[test]
    fn test_decode_truncated_payload_reports_mismatch() {
        let bytes = encode_message(&ChannelMessage::Pong(1), 0, 0).unwrap();
        let err = decode_message(&bytes[..HEADER_SIZE + 3]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadLengthMismatch {
                declared: 8,
                available: 3
            }
        );
    }

    #[test]
    fn test_header_declaring_oversized_payload_is_rejected() {
        // Arrange
        let mut header = encode_message(&ChannelMessage::OpenDevtools, 0, 0).unwrap();
        let declared = (MAX_PAYLOAD_LEN + 1) as u32;
        header[4..8].copy_from_slice(&declared.to_be_bytes());

        // Act
        let err = payload_len_from_header(&header).unwrap_err();

        // Assert
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_event_with_invalid_json_is_malformed() {
        // Arrange: a valid event frame whose JSON bytes are corrupted
        let mut bytes = encode_message(&ChannelMessage::event("x", json!([1])), 0, 0).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = b'}';

        // Act
        let err = decode_message(&bytes).unwrap_err();

        // Assert
        assert!(matches!(err, ProtocolError::MalformedPayload(_)), "{err:?}");
    }

    #[test]
    fn test_unknown_disconnect_reason_is_malformed() {
        let mut bytes = encode_message(
            &ChannelMessage::Disconnect {
                reason: DisconnectReason::SurfaceClosed,
            },
            0,
            0,
        )
        .unwrap();
        bytes[HEADER_SIZE] = 0xEE;
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_overlong_label_is_rejected() {
        // Arrange
        let msg = ChannelMessage::Hello(HelloMessage {
            surface_id: Uuid::nil(),
            protocol_version: PROTOCOL_VERSION,
            label: "l".repeat(u16::MAX as usize + 1),
        });

        // Act
        let err = encode_message(&msg, 0, 0).unwrap_err();

        // Assert
        assert!(matches!(err, ProtocolError::MalformedPayload(_)), "{err:?}");
        assert_eq!(validate_message(&msg), Err(err));
    }

    #[test]
    fn test_overlong_event_name_is_rejected_not_renamed() {
        let msg = ChannelMessage::event("n".repeat(70_000), json!(null));

        assert!(matches!(encode_message(&msg, 0, 0), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(validate_message(&msg), Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_label_at_prefix_limit_round_trips() {
        let msg = ChannelMessage::Hello(HelloMessage {
            surface_id: Uuid::nil(),
            protocol_version: PROTOCOL_VERSION,
            label: "l".repeat(u16::MAX as usize),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_validate_refuses_oversized_event() {
        // Arrange: the JSON string alone is past the frame limit
        let msg = ChannelMessage::event("error:emit", json!("x".repeat(MAX_PAYLOAD_LEN)));

        // Act
        let err = validate_message(&msg).unwrap_err();

        // Assert
        assert!(matches!(err, ProtocolError::PayloadTooLarge { .. }), "{err:?}");
        assert!(matches!(
            encode_message(&msg, 0, 0),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_agrees_with_encoded_size() {
        let msg = ChannelMessage::event("app:about", json!({"nested": [1, 2, {"k": "v"}]}));

        assert_eq!(validate_message(&msg), Ok(()));
        assert!(encode_message(&msg, 0, 0).is_ok());
    }

    #[test]
    fn test_two_frames_in_one_buffer_decode_in_order() {
        let mut buf = encode_message(&ChannelMessage::Ping(1), 0, 0).unwrap();
        buf.extend(encode_message(&ChannelMessage::event("app:about", json!(null)), 1, 0).unwrap());

        let (first, n) = decode_message(&buf).unwrap();
        let (second, m) = decode_message(&buf[n..]).unwrap();

        assert_eq!(first, ChannelMessage::Ping(1));
        assert_eq!(second, ChannelMessage::event("app:about", json!(null)));
        assert_eq!(n + m, buf.len());
    }
}
