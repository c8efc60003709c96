//! Payload codec seam
//!
//! The routing core treats payloads as opaque blobs. It only needs a way to
//! turn a payload into a [`Message`] (to read the id, sender, and private
//! flag) and back. Real deployments plug in their own serialization; the
//! simulator defaults to [`PostcardCodec`].

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::message::Message;

/// Encode/decode messages to and from packet payloads
pub trait MessageCodec: Send + Sync {
    /// Encode a message into a payload
    fn encode(&self, message: &Message) -> CodecResult<Vec<u8>>;

    /// Decode a payload into a message
    fn decode(&self, payload: &[u8]) -> CodecResult<Message>;
}

/// Wire format for message payloads (versioned for future compatibility)
#[derive(Debug, Serialize, Deserialize)]
pub enum WireMessage {
    /// Version 0 format
    V0(Message),
}

/// Default codec using postcard
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl MessageCodec for PostcardCodec {
    fn encode(&self, message: &Message) -> CodecResult<Vec<u8>> {
        postcard::to_allocvec(&WireMessage::V0(message.clone()))
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> CodecResult<Message> {
        if payload.is_empty() {
            return Err(CodecError::Empty);
        }
        let WireMessage::V0(message) = postcard::from_bytes(payload)?;
        Ok(message)
    }
}
