//! # Meshsim Core
//!
//! Core types, errors, and collaborator traits for the in-process mesh
//! simulator.
//!
//! The simulator routes packets it does not own the format of: payloads are
//! produced and consumed through the [`MessageCodec`] seam, and everything a
//! node observes is reported through a [`NodeDelegate`].
//!
//! ## Key Types
//!
//! - [`PeerAddress`]: Logical, string-like address a test uses to reach a node
//! - [`NodeId`]: Identity of one in-memory node instance
//! - [`Packet`]: The routed envelope (sender, optional recipient, TTL, opaque payload)
//! - [`Message`]: The decoded content carried inside a packet's payload
//!
//! ## Key Traits
//!
//! - [`MessageCodec`]: Payload encode/decode ([`PostcardCodec`] by default)
//! - [`NodeDelegate`]: Upward callbacks for deliveries and peer changes

pub mod codec;
pub mod delegate;
pub mod error;
pub mod identity;
pub mod message;
pub mod packet;

// Re-export main types
pub use codec::*;
pub use delegate::*;
pub use error::*;
pub use identity::*;
pub use message::*;
pub use packet::*;
