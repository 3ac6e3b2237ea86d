//! Channel message types.
//!
//! The host and a UI process exchange a small control vocabulary (handshake,
//! keepalive, disconnect) plus two bridge messages: a named [`EventMessage`]
//! and the devtools request addressed to a single surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::Payload;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Largest payload accepted by the decoder (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Control (0x00–0x0F)
    Hello = 0x01,
    HelloAck = 0x02,
    Ping = 0x07,
    Pong = 0x08,
    Disconnect = 0x09,
    // Bridge (0x10–0x1F)
    Event = 0x10,
    OpenDevtools = 0x11,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Hello),
            0x02 => Ok(MessageType::HelloAck),
            0x07 => Ok(MessageType::Ping),
            0x08 => Ok(MessageType::Pong),
            0x09 => Ok(MessageType::Disconnect),
            0x10 => Ok(MessageType::Event),
            0x11 => Ok(MessageType::OpenDevtools),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// HELLO (0x01): first frame a UI process sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Identity assigned by the host at launch, or self-generated.
    pub surface_id: Uuid,
    pub protocol_version: u8,
    /// Window label, e.g. `"main"`.
    pub label: String,
}

/// HELLO_ACK (0x02): the host's answer to [`HelloMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloAckMessage {
    pub accepted: bool,
    /// One of [`reject_reason`]; 0 when accepted.
    pub reject_reason: u8,
}

/// Reasons carried by a rejecting [`HelloAckMessage`].
pub mod reject_reason {
    pub const NONE: u8 = 0x00;
    pub const VERSION_MISMATCH: u8 = 0x01;
    pub const DUPLICATE_SURFACE: u8 = 0x02;
}

/// EVENT (0x10): a named bridge event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub name: String,
    pub payload: Payload,
}

impl EventMessage {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Why a side is closing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisconnectReason {
    UserInitiated = 0x00,
    SurfaceClosed = 0x01,
    HostShutdown = 0x02,
    ProtocolError = 0x03,
}

impl TryFrom<u8> for DisconnectReason {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(DisconnectReason::UserInitiated),
            0x01 => Ok(DisconnectReason::SurfaceClosed),
            0x02 => Ok(DisconnectReason::HostShutdown),
            0x03 => Ok(DisconnectReason::ProtocolError),
            _ => Err(()),
        }
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every frame that can travel over the host/UI channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Hello(HelloMessage),
    HelloAck(HelloAckMessage),
    Ping(u64),
    Pong(u64),
    Disconnect { reason: DisconnectReason },
    Event(EventMessage),
    OpenDevtools,
}

impl ChannelMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ChannelMessage::Hello(_) => MessageType::Hello,
            ChannelMessage::HelloAck(_) => MessageType::HelloAck,
            ChannelMessage::Ping(_) => MessageType::Ping,
            ChannelMessage::Pong(_) => MessageType::Pong,
            ChannelMessage::Disconnect { .. } => MessageType::Disconnect,
            ChannelMessage::Event(_) => MessageType::Event,
            ChannelMessage::OpenDevtools => MessageType::OpenDevtools,
        }
    }

    /// Shorthand for an [`ChannelMessage::Event`] frame.
    pub fn event(name: impl Into<String>, payload: Payload) -> Self {
        ChannelMessage::Event(EventMessage::new(name, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes_round_trip_through_u8() {
        for ty in [
            MessageType::Hello,
            MessageType::HelloAck,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Disconnect,
            MessageType::Event,
            MessageType::OpenDevtools,
        ] {
            assert_eq!(MessageType::try_from(ty as u8), Ok(ty));
        }
    }

    #[test]
    fn test_unknown_message_type_code_is_rejected() {
        assert_eq!(MessageType::try_from(0x40), Err(()));
        assert_eq!(MessageType::try_from(0x00), Err(()));
    }

    #[test]
    fn test_disconnect_reason_rejects_unknown_code() {
        assert_eq!(DisconnectReason::try_from(0x02), Ok(DisconnectReason::HostShutdown));
        assert_eq!(DisconnectReason::try_from(0x7F), Err(()));
    }

    #[test]
    fn test_event_shorthand_builds_event_frame() {
        let msg = ChannelMessage::event("app:about", Payload::Null);
        assert_eq!(msg.message_type(), MessageType::Event);
    }
}
