//! Error types for meshsim

use thiserror::Error;

/// Errors produced by a [`crate::MessageCodec`]
///
/// The simulator never propagates these: an encode failure yields an empty
/// payload and a decode failure marks the packet as undecodable.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("payload is empty")]
    Empty,
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        CodecError::Decode(e.to_string())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
