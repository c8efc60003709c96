//! Upward callbacks from a simulated node
//!
//! A [`NodeDelegate`] receives everything the node delivers: decoded
//! messages (including the sender's own deferred echo) and changes to its
//! connected-peer bookkeeping.

use parking_lot::Mutex;

use crate::identity::PeerAddress;
use crate::message::{Message, MessageId};

/// Observer of a simulated node
///
/// All methods default to no-ops so implementors only override what they
/// need.
pub trait NodeDelegate: Send + Sync {
    /// A message was delivered to this node
    fn on_message_received(&self, _message: &Message) {}

    /// A peer was marked connected
    fn on_peer_connected(&self, _peer: &PeerAddress) {}

    /// A peer was marked disconnected
    fn on_peer_disconnected(&self, _peer: &PeerAddress) {}

    /// The connected-peer list changed
    fn on_peer_list_updated(&self, _peers: &[PeerAddress]) {}
}

/// Delegate that ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl NodeDelegate for NoopDelegate {}

/// Delegate that records every callback for later assertions
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    messages: Mutex<Vec<Message>>,
    connected: Mutex<Vec<PeerAddress>>,
    disconnected: Mutex<Vec<PeerAddress>>,
    peer_lists: Mutex<Vec<Vec<PeerAddress>>>,
}

impl RecordingDelegate {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All delivered messages, in delivery order
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Number of delivered messages
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Number of deliveries of a specific message id
    pub fn count_of(&self, id: &MessageId) -> usize {
        self.messages.lock().iter().filter(|m| &m.id == id).count()
    }

    /// Contents of delivered messages, in delivery order
    pub fn contents(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    /// Peers reported as connected, in callback order
    pub fn connected(&self) -> Vec<PeerAddress> {
        self.connected.lock().clone()
    }

    /// Peers reported as disconnected, in callback order
    pub fn disconnected(&self) -> Vec<PeerAddress> {
        self.disconnected.lock().clone()
    }

    /// The most recent peer list update
    pub fn last_peer_list(&self) -> Option<Vec<PeerAddress>> {
        self.peer_lists.lock().last().cloned()
    }

    /// Number of peer list updates received
    pub fn peer_list_updates(&self) -> usize {
        self.peer_lists.lock().len()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.messages.lock().clear();
        self.connected.lock().clear();
        self.disconnected.lock().clear();
        self.peer_lists.lock().clear();
    }
}

impl NodeDelegate for RecordingDelegate {
    fn on_message_received(&self, message: &Message) {
        self.messages.lock().push(message.clone());
    }

    fn on_peer_connected(&self, peer: &PeerAddress) {
        self.connected.lock().push(peer.clone());
    }

    fn on_peer_disconnected(&self, peer: &PeerAddress) {
        self.disconnected.lock().push(peer.clone());
    }

    fn on_peer_list_updated(&self, peers: &[PeerAddress]) {
        self.peer_lists.lock().push(peers.to_vec());
    }
}
