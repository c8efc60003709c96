//! Packet envelope routed between simulated nodes

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::identity::PeerAddress;

/// Default hop budget for freshly originated packets
pub const DEFAULT_TTL: u8 = 3;

/// Packet kinds of the mesh protocol
///
/// The simulator only builds [`PacketType::Message`] packets itself. Other
/// kinds are produced by external layers (handshakes, receipts) and are
/// routed untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PacketType {
    /// Peer announcement
    Announce,
    /// Chat message carrying an encoded [`crate::Message`]
    #[default]
    Message,
    /// Peer leaving the mesh
    Leave,
    /// Handshake frame of the encryption layer
    NoiseHandshake,
    /// Encrypted frame of the encryption layer
    NoiseEncrypted,
    /// Delivery acknowledgement
    DeliveryAck,
    /// Read receipt
    ReadReceipt,
}

/// A routed packet
///
/// The routing core reads and writes only `recipient_id` and `ttl`; every
/// other field is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Kind of packet
    pub packet_type: PacketType,
    /// Address of the originating peer
    pub sender_id: PeerAddress,
    /// Recipient address; `None` means broadcast
    pub recipient_id: Option<PeerAddress>,
    /// Creation time in milliseconds since the UNIX epoch (informational)
    pub timestamp: u64,
    /// Opaque payload
    pub payload: Vec<u8>,
    /// Optional signature over the payload
    pub signature: Option<Vec<u8>>,
    /// Remaining hop budget
    pub ttl: u8,
}

impl Packet {
    /// Create a packet with the default hop budget and the current time
    pub fn new(
        packet_type: PacketType,
        sender_id: PeerAddress,
        recipient_id: Option<PeerAddress>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            packet_type,
            sender_id,
            recipient_id,
            timestamp: now_millis(),
            payload,
            signature: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// Create a packet with custom TTL
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Create a packet with a custom timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a signature
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Whether this packet is addressed to everyone
    pub fn is_broadcast(&self) -> bool {
        self.recipient_id.is_none()
    }

    /// Copy of this packet for the next hop: TTL decremented, floored at 0
    pub fn relayed(&self) -> Self {
        Self {
            ttl: self.ttl.saturating_sub(1),
            ..self.clone()
        }
    }
}

/// Current time in milliseconds since the UNIX epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
