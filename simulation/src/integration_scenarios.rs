//! Integration scenarios exercising the topology graph and node simulator
//! together
//!
//! These scenarios cover:
//! - link symmetry and topology changes mid-test
//! - broadcast fan-out, dedup and flood relay
//! - unicast adjacency shortcut and relay fallback
//! - deferred self-echo delivery
//! - observer hooks around undecodable packets

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use meshsim_core::{
    Message, MessageCodec, MessageId, Packet, PacketType, PeerAddress, PostcardCodec,
    RecordingDelegate,
};

use crate::config::SimConfig;
use crate::node::{NodeSimulator, OutgoingMessage};
use crate::topology::TopologyGraph;

fn addr(s: &str) -> PeerAddress {
    PeerAddress::new(s)
}

/// Registered nodes with recording delegates
fn mesh(
    graph: &Arc<TopologyGraph>,
    names: &[&str],
) -> Vec<(Arc<NodeSimulator>, Arc<RecordingDelegate>)> {
    names
        .iter()
        .map(|name| {
            let delegate = Arc::new(RecordingDelegate::new());
            let node = NodeSimulator::builder(graph, *name)
                .delegate(delegate.clone())
                .build();
            node.register();
            (node, delegate)
        })
        .collect()
}

fn broadcast_packet(sender: &str, id: &str, content: &str) -> Packet {
    let message = Message::broadcast(MessageId::new(id), addr(sender), content, 0);
    Packet::new(
        PacketType::Message,
        addr(sender),
        None,
        PostcardCodec.encode(&message).unwrap(),
    )
}

#[test]
fn test_link_symmetry() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B"]);
    let (a, b) = (n[0].0.id(), n[1].0.id());

    n[0].0.connect_to("B");
    assert!(graph.is_direct_neighbor(a, b));
    assert!(graph.is_direct_neighbor(b, a));

    n[0].0.disconnect_from("B");
    assert!(!graph.is_direct_neighbor(a, b));
    assert!(!graph.is_direct_neighbor(b, a));
}

#[test]
fn test_broadcast_reaches_each_neighbor_once() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "N1", "N2", "N3", "FAR"]);
    graph.connect_star(&addr("S"), &[addr("N1"), addr("N2"), addr("N3")]);
    graph.connect(&addr("N1"), &addr("FAR"));

    let message = n[0].0.send(OutgoingMessage::broadcast("hello"));

    for (node, delegate) in &n[1..4] {
        assert_eq!(delegate.count_of(&message.id), 1, "{}", node.address());
    }
    // Flood relay is off by default
    assert_eq!(n[4].1.message_count(), 0);
    // The sender only ever sees its deferred echo
    assert_eq!(n[0].1.message_count(), 0);
    assert_eq!(n[0].0.stats().packets_received, 0);
}

#[test]
fn test_dedup_idempotence() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["B"]);
    let packet = broadcast_packet("A", "dup-1", "twice");

    n[0].0.receive_incoming_packet(&packet);
    n[0].0.receive_incoming_packet(&packet.relayed());

    assert_eq!(n[0].1.count_of(&MessageId::new("dup-1")), 1);
    assert_eq!(n[0].0.stats().duplicates_dropped, 1);
}

#[test]
fn test_unicast_adjacent_recipient_only() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "R", "OTHER"]);
    n[0].0.connect_to("R");
    n[0].0.connect_to("OTHER");

    n[0].0.send(OutgoingMessage::to("R", "direct"));

    assert_eq!(n[1].1.contents(), vec!["direct"]);
    assert_eq!(n[2].1.message_count(), 0);
    assert_eq!(n[2].0.stats().packets_received, 0);
}

#[test]
fn test_unicast_fallback_reaches_recipient_and_neighbors() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "R", "N1", "N2"]);
    n[0].0.connect_to("N1");
    n[0].0.connect_to("N2");

    let message = n[0].0.send(OutgoingMessage::to("R", "find R"));

    assert_eq!(n[1].1.count_of(&message.id), 1);
    assert_eq!(n[2].1.count_of(&message.id), 1);
    assert_eq!(n[3].1.count_of(&message.id), 1);
}

#[test]
fn test_unicast_to_unregistered_recipient_still_relays() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "N1"]);
    n[0].0.connect_to("N1");

    n[0].0.send(OutgoingMessage::to("nobody", "lost"));

    assert_eq!(n[1].1.contents(), vec!["lost"]);
}

#[test]
fn test_unicast_is_never_flood_relayed() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "N1", "N2", "R"]);
    graph.connect_line(&[addr("S"), addr("N1"), addr("N2")]);
    for (node, _) in &n {
        node.set_flood_enabled(true);
    }

    // Public but addressed: still unicast, so N1 does not forward it
    n[0].0.send(OutgoingMessage::to("R", "addressed").with_private(false));

    assert_eq!(n[1].1.message_count(), 1);
    assert_eq!(n[2].1.message_count(), 0);
    assert_eq!(n[3].1.message_count(), 1);
}

#[test]
fn test_relay_suppressed_toward_declared_sender() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B"]);
    graph.connect(&addr("A"), &addr("B"));
    n[1].0.set_flood_enabled(true);

    let arrivals = Arc::new(AtomicUsize::new(0));
    {
        let arrivals = arrivals.clone();
        n[0].0.set_packet_observer(move |_| {
            arrivals.fetch_add(1, Ordering::SeqCst);
        });
    }

    // B delivers a message declared as A's and must not hand it back to A
    n[1].0.receive_incoming_packet(&broadcast_packet("A", "m1", "yours"));

    assert_eq!(n[1].1.message_count(), 1);
    assert_eq!(arrivals.load(Ordering::SeqCst), 0);
    assert_eq!(n[1].0.stats().packets_relayed, 0);
}

#[test]
fn test_private_broadcast_not_relayed() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B", "C"]);
    graph.connect_line(&[addr("A"), addr("B"), addr("C")]);
    for (node, _) in &n {
        node.set_flood_enabled(true);
    }

    n[0].0.send(OutgoingMessage::broadcast("hush").with_private(true));

    assert_eq!(n[1].1.message_count(), 1);
    assert_eq!(n[2].1.message_count(), 0);
}

#[test]
fn test_line_flood_end_to_end() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B", "C"]);
    n[0].0.connect_to("B");
    n[1].0.connect_to("C");
    for (node, _) in &n {
        node.set_flood_enabled(true);
    }

    let message = n[0].0.send(OutgoingMessage::broadcast("hi"));
    assert_eq!(n[0].0.sent_messages()[0].packet.ttl, 3);

    assert_eq!(n[1].1.contents(), vec!["hi"]);
    assert_eq!(n[2].1.contents(), vec!["hi"]);
    assert_eq!(n[0].1.message_count(), 0);

    // C relayed back toward B, which absorbed it
    assert_eq!(n[1].0.stats().duplicates_dropped, 1);

    assert_eq!(n[0].0.drain_self_echoes(), 1);
    assert_eq!(n[0].1.count_of(&message.id), 1);
}

#[test]
fn test_ttl_decrements_but_does_not_stop_relay() {
    let graph = TopologyGraph::with_config(SimConfig::default().with_default_ttl(1));
    let names = ["A", "B", "C", "D", "E"];
    let n = mesh(&graph, &names);
    graph.connect_line(&names.map(addr));
    for (node, _) in &n {
        node.set_flood_enabled(true);
    }

    let ttls = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let ttls = ttls.clone();
        n[4].0.set_packet_observer(move |packet| ttls.lock().push(packet.ttl));
    }

    n[0].0.send(OutgoingMessage::broadcast("far"));

    assert_eq!(n[4].1.contents(), vec!["far"]);
    assert_eq!(*ttls.lock(), vec![0]);
}

#[test]
fn test_private_message_to_unconnected_node() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["X", "Y", "Z"]);
    graph.connect(&addr("Y"), &addr("Z"));
    for (node, _) in &n {
        node.set_flood_enabled(true);
    }

    let message = n[0].0.send(OutgoingMessage::to("Y", "secret"));

    assert!(message.is_private);
    assert_eq!(n[1].1.count_of(&message.id), 1);
    assert_eq!(n[2].0.stats().packets_received, 0);
    assert_eq!(n[0].0.stats().packets_received, 0);
}

#[test]
fn test_topology_change_mid_test() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B", "C"]);
    n[0].0.connect_to("B");

    n[0].0.send(OutgoingMessage::broadcast("first"));
    n[0].0.disconnect_from("B");
    n[0].0.connect_to("C");
    n[0].0.send(OutgoingMessage::broadcast("second"));

    assert_eq!(n[1].1.contents(), vec!["first"]);
    assert_eq!(n[2].1.contents(), vec!["second"]);
}

#[test]
fn test_reregistered_address_routes_to_new_node() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["S", "R"]);

    let replacement_delegate = Arc::new(RecordingDelegate::new());
    let replacement = NodeSimulator::builder(&graph, "R-new")
        .delegate(replacement_delegate.clone())
        .build();
    graph.register(&replacement, "R");

    n[0].0.send(OutgoingMessage::to("R", "who's there"));

    assert_eq!(replacement_delegate.contents(), vec!["who's there"]);
    assert_eq!(n[1].1.message_count(), 0);
    assert_eq!(replacement.address(), addr("R"));
}

#[test]
fn test_undecodable_packet_fires_observer_only() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B", "C"]);
    graph.connect_line(&[addr("A"), addr("B"), addr("C")]);
    n[1].0.set_flood_enabled(true);

    let observed = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let observed = observed.clone();
        n[1].0.set_packet_observer(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        let delivered = delivered.clone();
        n[1].0.set_message_observer(move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        });
    }

    n[0].0.send_packet(Packet::new(
        PacketType::NoiseEncrypted,
        addr("A"),
        None,
        b"not a message".to_vec(),
    ));

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert_eq!(n[1].1.message_count(), 0);
    assert_eq!(n[1].0.stats().undecodable_packets, 1);
    // Undecodable packets are not relayed
    assert_eq!(n[2].0.stats().packets_received, 0);
}

#[test]
fn test_intercepting_observer_can_reroute() {
    // A test harness taps packets on the sender and replays them elsewhere
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B"]);
    let tapped = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let tapped = tapped.clone();
        n[0].0.set_packet_observer(move |packet| tapped.lock().push(packet.clone()));
    }

    n[0].0.send(OutgoingMessage::broadcast("tap me"));
    assert_eq!(n[1].1.message_count(), 0);

    let packets = tapped.lock().clone();
    assert_eq!(packets.len(), 1);
    n[1].0.receive_incoming_packet(&packets[0]);
    assert_eq!(n[1].1.contents(), vec!["tap me"]);
}

#[test]
fn test_send_returns_before_self_echo() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A"]);

    let message = n[0].0.send(OutgoingMessage::broadcast("me"));
    assert_eq!(n[0].1.message_count(), 0);
    assert_eq!(n[0].0.pending_self_echoes(), 1);

    let echoed = tokio_test::block_on(n[0].0.next_self_echo()).unwrap();
    assert_eq!(echoed.id, message.id);
    assert_eq!(n[0].1.count_of(&message.id), 1);
}

#[tokio::test]
async fn test_await_self_echo() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "B"]);
    n[0].0.connect_to("B");

    let message = n[0].0.send(OutgoingMessage::broadcast("echo"));
    assert_eq!(n[0].1.message_count(), 0);

    let echoed = tokio::time::timeout(Duration::from_secs(1), n[0].0.next_self_echo())
        .await
        .expect("self-echo not delivered")
        .unwrap();

    assert_eq!(echoed, message);
    assert_eq!(n[0].1.contents(), vec!["echo"]);
    assert_eq!(n[1].1.contents(), vec!["echo"]);
}

#[test]
fn test_dropped_node_leaves_fan_out() {
    let graph = TopologyGraph::new();
    let mut n = mesh(&graph, &["A", "B", "C"]);
    graph.connect_star(&addr("A"), &[addr("B"), addr("C")]);

    let (c, c_delegate) = n.pop().unwrap();
    drop(c);

    n[0].0.send(OutgoingMessage::broadcast("still here?"));
    assert_eq!(n[1].1.message_count(), 1);
    assert_eq!(c_delegate.message_count(), 0);
}

#[test]
fn test_sender_still_delivers_its_id_from_another_sender() {
    let graph = TopologyGraph::new();
    let n = mesh(&graph, &["A", "C"]);

    let sent = n[0].0.send(OutgoingMessage::broadcast("mine").with_id("x"));
    assert!(!n[0].0.has_seen(&sent.id));

    n[0].0.receive_incoming_packet(&broadcast_packet("C", "x", "theirs"));
    assert_eq!(n[0].1.count_of(&MessageId::new("x")), 1);
    assert_eq!(n[0].0.stats().messages_delivered, 1);
    assert_eq!(n[0].0.stats().duplicates_dropped, 0);
}

/// Records the node context found on every new span
#[derive(Clone, Default)]
struct SpanContextRecorder {
    spans: Arc<parking_lot::Mutex<Vec<Option<String>>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanContextRecorder
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let address = ctx.span(id).and_then(|span| {
            span.extensions()
                .get::<meshsim_logging::NodeContextExtension>()
                .map(|ext| ext.data.address.clone())
        });
        self.spans.lock().push(address);
    }
}

#[test]
fn test_flood_spans_carry_node_context() {
    use tracing_subscriber::layer::SubscriberExt;

    let recorder = SpanContextRecorder::default();
    let subscriber = tracing_subscriber::registry()
        .with(meshsim_logging::NodeContextLayer::new())
        .with(recorder.clone());

    tracing::subscriber::with_default(subscriber, || {
        let graph = TopologyGraph::new();
        let n = mesh(&graph, &["A", "B", "C"]);
        graph.connect_line(&[addr("A"), addr("B"), addr("C")]);
        for (node, _) in &n {
            node.set_flood_enabled(true);
        }
        n[0].0.send(OutgoingMessage::broadcast("traced"));
        assert_eq!(n[2].1.message_count(), 1);
    });

    let spans = recorder.spans.lock().clone();
    assert!(!spans.is_empty());
    assert!(spans.iter().all(Option::is_some), "untagged span: {spans:?}");
    let addresses: Vec<_> = spans.into_iter().flatten().collect();
    assert!(addresses.iter().any(|a| a == "B"));
    assert!(addresses.iter().any(|a| a == "C"));
}
