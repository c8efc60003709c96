//! Simulated mesh node
//!
//! One [`NodeSimulator`] per participant. A node owns its dedup cache, its
//! local view of connected peers and its send history, and reaches the
//! rest of the network only through a non-owning handle to the shared
//! [`TopologyGraph`].
//!
//! Delivery is synchronous and depth-first: `send` fans out through the
//! graph into neighbors' [`NodeSimulator::receive_incoming_packet`], which
//! may relay further before returning. The one exception is the sender's
//! own echo, which is parked on a [`SelfEchoQueue`] until the harness
//! drains it.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use meshsim_core::{
    Message, MessageCodec, MessageId, NodeDelegate, NodeId, NoopDelegate, Packet, PacketType,
    PeerAddress, PostcardCodec, now_millis,
};
use meshsim_logging::NodeContextGuard;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, debug_span, instrument, trace, warn};
use uuid::Uuid;

use crate::echo::SelfEchoQueue;
use crate::stats::{NodeStats, NodeStatsSnapshot};
use crate::topology::TopologyGraph;

/// Hook invoked with every packet a node sends or receives
pub type PacketObserver = Arc<dyn Fn(&Packet) + Send + Sync>;

/// Hook invoked with every message a node delivers
pub type MessageObserver = Arc<dyn Fn(&Message) + Send + Sync>;

/// A message and the packet that carried it, as recorded by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub message: Message,
    pub packet: Packet,
}

/// Message to be sent from a node
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    content: String,
    recipient: Option<PeerAddress>,
    id: Option<MessageId>,
    timestamp: Option<u64>,
    nickname: Option<String>,
    private: Option<bool>,
}

impl OutgoingMessage {
    /// Public message for every reachable node
    pub fn broadcast(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Message addressed to `recipient`, private unless overridden
    pub fn to(recipient: impl Into<PeerAddress>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient: Some(recipient.into()),
            ..Default::default()
        }
    }

    /// Use a caller-chosen id instead of a fresh one
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Override the private flag
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = Some(private);
        self
    }
}

/// Builder for a [`NodeSimulator`]
pub struct NodeSimulatorBuilder {
    graph: Arc<TopologyGraph>,
    address: PeerAddress,
    codec: Arc<dyn MessageCodec>,
    delegate: Arc<dyn NodeDelegate>,
    flood_relay: bool,
    default_ttl: u8,
}

impl NodeSimulatorBuilder {
    /// Start from the graph's configuration
    pub fn new(graph: &Arc<TopologyGraph>, address: impl Into<PeerAddress>) -> Self {
        let config = graph.config();
        Self {
            graph: Arc::clone(graph),
            address: address.into(),
            codec: Arc::new(PostcardCodec),
            delegate: Arc::new(NoopDelegate),
            flood_relay: config.flood_relay,
            default_ttl: config.default_ttl,
        }
    }

    pub fn codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn NodeDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    pub fn flood_relay(mut self, enabled: bool) -> Self {
        self.flood_relay = enabled;
        self
    }

    pub fn default_ttl(mut self, ttl: u8) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Build the node; it registers with the graph lazily
    pub fn build(self) -> Arc<NodeSimulator> {
        let id = self.graph.allocate_node_id();
        let trace_routing = self.graph.config().trace_routing;

        Arc::new_cyclic(|me| NodeSimulator {
            id,
            instance_id: Uuid::new_v4(),
            me: me.clone(),
            graph: Arc::downgrade(&self.graph),
            address: RwLock::new(self.address),
            registered: AtomicBool::new(false),
            connected: Mutex::new(BTreeSet::new()),
            seen: Mutex::new(HashSet::new()),
            flood_enabled: AtomicBool::new(self.flood_relay),
            default_ttl: self.default_ttl,
            trace_routing,
            sent: Mutex::new(Vec::new()),
            stats: NodeStats::new(),
            echoes: SelfEchoQueue::new(),
            codec: self.codec,
            delegate: self.delegate,
            packet_observer: RwLock::new(None),
            message_observer: RwLock::new(None),
        })
    }
}

/// One simulated participant in the mesh
pub struct NodeSimulator {
    id: NodeId,
    /// Tags this node's log context
    instance_id: Uuid,
    me: Weak<NodeSimulator>,
    graph: Weak<TopologyGraph>,
    address: RwLock<PeerAddress>,
    registered: AtomicBool,
    /// Local view, independent of graph adjacency
    connected: Mutex<BTreeSet<PeerAddress>>,
    /// Message ids already delivered by this node
    seen: Mutex<HashSet<MessageId>>,
    flood_enabled: AtomicBool,
    default_ttl: u8,
    trace_routing: bool,
    sent: Mutex<Vec<SentRecord>>,
    stats: NodeStats,
    echoes: SelfEchoQueue,
    codec: Arc<dyn MessageCodec>,
    delegate: Arc<dyn NodeDelegate>,
    packet_observer: RwLock<Option<PacketObserver>>,
    message_observer: RwLock<Option<MessageObserver>>,
}

impl NodeSimulator {
    /// Node with the default codec and a no-op delegate
    pub fn new(graph: &Arc<TopologyGraph>, address: impl Into<PeerAddress>) -> Arc<Self> {
        NodeSimulatorBuilder::new(graph, address).build()
    }

    pub fn builder(graph: &Arc<TopologyGraph>, address: impl Into<PeerAddress>) -> NodeSimulatorBuilder {
        NodeSimulatorBuilder::new(graph, address)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> PeerAddress {
        self.address.read().clone()
    }

    /// Change the address; ignored once the node is registered
    ///
    /// Returns whether the change took effect.
    pub fn set_address(&self, address: impl Into<PeerAddress>) -> bool {
        if self.registered.load(Ordering::Acquire) {
            return false;
        }
        *self.address.write() = address.into();
        true
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Register this node with the graph under its current address
    pub fn register(&self) {
        let Some(graph) = self.graph.upgrade() else {
            warn!(node = %self.id, "register ignored, topology dropped");
            return;
        };
        graph.insert(self.id, self.me.clone(), self.address());
        self.registered.store(true, Ordering::Release);
    }

    /// Adopt an address assigned by the graph
    pub(crate) fn bind(&self, address: PeerAddress) {
        *self.address.write() = address;
        self.registered.store(true, Ordering::Release);
    }

    fn ensure_registered(&self) {
        if !self.is_registered() {
            self.register();
        }
    }

    pub fn set_flood_enabled(&self, enabled: bool) {
        self.flood_enabled.store(enabled, Ordering::Release);
    }

    pub fn flood_enabled(&self) -> bool {
        self.flood_enabled.load(Ordering::Acquire)
    }

    pub fn set_packet_observer(&self, observer: impl Fn(&Packet) + Send + Sync + 'static) {
        *self.packet_observer.write() = Some(Arc::new(observer));
    }

    pub fn clear_packet_observer(&self) {
        *self.packet_observer.write() = None;
    }

    pub fn set_message_observer(&self, observer: impl Fn(&Message) + Send + Sync + 'static) {
        *self.message_observer.write() = Some(Arc::new(observer));
    }

    pub fn clear_message_observer(&self) {
        *self.message_observer.write() = None;
    }

    /// Build and route a message
    ///
    /// Records it in the send history, parks the self-echo, then routes:
    /// broadcast without a recipient, unicast with one. Returns before the
    /// self-echo is delivered.
    pub fn send(&self, outgoing: OutgoingMessage) -> Message {
        self.ensure_registered();
        let sender = self.address();

        let is_private = outgoing.private.unwrap_or(outgoing.recipient.is_some());
        let message = Message {
            id: outgoing.id.unwrap_or_else(MessageId::generate),
            sender: sender.clone(),
            sender_nickname: outgoing.nickname,
            recipient: outgoing.recipient,
            is_private,
            content: outgoing.content,
            timestamp: outgoing.timestamp.unwrap_or_else(now_millis),
        };

        let payload = match self.codec.encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "encode failed, sending empty payload");
                Vec::new()
            }
        };
        let packet = Packet::new(
            PacketType::Message,
            sender,
            message.recipient.clone(),
            payload,
        )
        .with_ttl(self.default_ttl)
        .with_timestamp(message.timestamp);

        self.sent.lock().push(SentRecord {
            message: message.clone(),
            packet: packet.clone(),
        });
        self.stats.record_sent();
        self.echoes.push(message.clone());

        debug!(
            node = %packet.sender_id,
            message_id = %message.id,
            private = message.is_private,
            "sending"
        );
        self.dispatch(&packet);
        message
    }

    /// Route a pre-built packet without building a message
    pub fn send_packet(&self, packet: Packet) {
        self.ensure_registered();
        self.dispatch(&packet);
    }

    fn dispatch(&self, packet: &Packet) {
        self.notify_packet_observer(packet);

        let Some(graph) = self.graph.upgrade() else {
            warn!(node = %self.id, "packet dropped, topology dropped");
            return;
        };
        match &packet.recipient_id {
            None => graph.route_broadcast(packet, self.id),
            Some(recipient) => graph.route_unicast(packet, self.id, recipient),
        }
    }

    /// Handle a packet arriving from the mesh
    ///
    /// The packet observer sees every arrival. Undecodable payloads and
    /// already-seen ids stop there; new messages are delivered and, when
    /// flood relay is on, public broadcasts are forwarded.
    pub fn receive_incoming_packet(&self, packet: &Packet) {
        let address = self.address();
        let _ctx = NodeContextGuard::with_instance_id(&address, self.instance_id);
        let _span = debug_span!(
            "receive",
            node = %address,
            from = %packet.sender_id,
            ttl = packet.ttl
        )
        .entered();

        self.stats.record_packet();
        if self.trace_routing {
            trace!(
                node = %address,
                from = %packet.sender_id,
                ttl = packet.ttl,
                "packet arrived"
            );
        }
        self.notify_packet_observer(packet);

        let message = match self.codec.decode(&packet.payload) {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_undecodable();
                debug!(node = %address, from = %packet.sender_id, error = %e, "undecodable payload");
                return;
            }
        };

        if !self.seen.lock().insert(message.id.clone()) {
            self.stats.record_duplicate();
            debug!(node = %address, message_id = %message.id, "duplicate absorbed");
            return;
        }

        self.stats.record_delivered();
        self.delegate.on_message_received(&message);
        self.notify_message_observer(&message);

        if self.flood_enabled() && packet.is_broadcast() && !message.is_private {
            self.relay(packet, &message);
        }
    }

    #[instrument(skip_all, fields(message_id = %message.id))]
    fn relay(&self, packet: &Packet, message: &Message) {
        let Some(graph) = self.graph.upgrade() else {
            return;
        };

        let targets: Vec<Arc<NodeSimulator>> = graph
            .neighbor_nodes(self.id)
            .into_iter()
            .filter(|node| node.address() != message.sender)
            .collect();
        if targets.is_empty() {
            return;
        }

        let next_hop = packet.relayed();
        debug!(
            ttl = next_hop.ttl,
            targets = targets.len(),
            "relaying"
        );
        self.stats.record_relayed(targets.len());

        for node in targets {
            node.receive_incoming_packet(&next_hop);
        }
    }

    fn notify_packet_observer(&self, packet: &Packet) {
        let observer = self.packet_observer.read().clone();
        if let Some(observer) = observer {
            observer(packet);
        }
    }

    fn notify_message_observer(&self, message: &Message) {
        let observer = self.message_observer.read().clone();
        if let Some(observer) = observer {
            observer(message);
        }
    }

    /// Link to `peer` in the graph and the local peer set
    pub fn connect_to(&self, peer: impl Into<PeerAddress>) {
        let peer = peer.into();
        self.ensure_registered();
        if let Some(graph) = self.graph.upgrade() {
            graph.connect(&self.address(), &peer);
        }

        let peers = {
            let mut connected = self.connected.lock();
            connected.insert(peer.clone());
            connected.iter().cloned().collect::<Vec<_>>()
        };
        self.delegate.on_peer_connected(&peer);
        self.delegate.on_peer_list_updated(&peers);
    }

    /// Unlink from `peer` in the graph and the local peer set
    pub fn disconnect_from(&self, peer: impl Into<PeerAddress>) {
        let peer = peer.into();
        if let Some(graph) = self.graph.upgrade() {
            graph.disconnect(&self.address(), &peer);
        }

        let peers = {
            let mut connected = self.connected.lock();
            connected.remove(&peer);
            connected.iter().cloned().collect::<Vec<_>>()
        };
        self.delegate.on_peer_disconnected(&peer);
        self.delegate.on_peer_list_updated(&peers);
    }

    /// Whether `peer` is in the local connected set
    pub fn is_connected(&self, peer: &PeerAddress) -> bool {
        self.connected.lock().contains(peer)
    }

    /// Local connected set, sorted
    pub fn list_peers(&self) -> Vec<PeerAddress> {
        self.connected.lock().iter().cloned().collect()
    }

    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.seen.lock().contains(id)
    }

    /// Forget every delivered id
    pub fn reset_seen(&self) {
        self.seen.lock().clear();
    }

    /// Send history, oldest first
    pub fn sent_messages(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    pub fn stats(&self) -> NodeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Echoes parked by `send` and not yet delivered
    pub fn pending_self_echoes(&self) -> usize {
        self.echoes.pending()
    }

    /// Deliver every parked self-echo to the delegate
    ///
    /// Returns how many were delivered.
    pub fn drain_self_echoes(&self) -> usize {
        let mut delivered = 0;
        while let Some(message) = self.echoes.try_next() {
            self.deliver_self_echo(&message);
            delivered += 1;
        }
        delivered
    }

    /// Wait for the next self-echo and deliver it to the delegate
    pub async fn next_self_echo(&self) -> Option<Message> {
        let message = self.echoes.next().await?;
        self.deliver_self_echo(&message);
        Some(message)
    }

    fn deliver_self_echo(&self, message: &Message) {
        self.stats.record_self_echo();
        self.delegate.on_message_received(message);
    }
}

impl Drop for NodeSimulator {
    fn drop(&mut self) {
        if let Some(graph) = self.graph.upgrade() {
            graph.remove(self.id);
        }
    }
}

impl std::fmt::Debug for NodeSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSimulator")
            .field("id", &self.id)
            .field("address", &self.address())
            .field("registered", &self.is_registered())
            .field("flood_enabled", &self.flood_enabled())
            .finish_non_exhaustive()
    }
}
