//! Wire format of the real-time layer
//!
//! Every WebSocket text frame carries one packet: `{"event": "...", "data": ...}`.
//! A missing `data` field is the "no payload" case and surfaces as `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names the transport uses for itself; handlers cannot claim them
pub const RESERVED_EVENTS: &[&str] = &[
    "connect",
    "connect_error",
    "disconnect",
    "disconnecting",
    "error",
];

/// Emitted to a client whose handshake named an unknown namespace
pub const CONNECT_ERROR: &str = "connect_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("packet has an empty event name")]
    EmptyEvent,
}

impl Packet {
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let packet: Packet = serde_json::from_str(text)?;
        if packet.event.is_empty() {
            return Err(PacketError::EmptyEvent);
        }
        Ok(packet)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn is_reserved(event: &str) -> bool {
    RESERVED_EVENTS.contains(&event)
}
