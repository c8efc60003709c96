//! Pre-defined scenarios for the mesh simulator
//!
//! Each scenario builds a fresh topology, drives a few sends and returns a
//! [`ScenarioReport`] with what every node saw.

use std::sync::Arc;

use meshsim_core::{PeerAddress, RecordingDelegate};
use serde::Serialize;
use tracing::info;

use crate::config::SimConfig;
use crate::node::{NodeSimulator, OutgoingMessage};
use crate::stats::NodeStatsSnapshot;
use crate::topology::TopologyGraph;

/// What one node observed during a scenario
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub address: PeerAddress,
    /// Contents handed to the delegate, self-echoes included
    pub received: Vec<String>,
    pub stats: NodeStatsSnapshot,
}

/// Outcome of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub topology: String,
    pub nodes: Vec<NodeReport>,
}

impl ScenarioReport {
    pub fn node(&self, address: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.address.as_str() == address)
    }

    /// Mesh deliveries to `address`, self-echoes excluded
    pub fn delivered_count(&self, address: &str) -> u64 {
        self.node(address)
            .map(|n| n.stats.messages_delivered)
            .unwrap_or(0)
    }

    /// Total packets forwarded by flood relay
    pub fn total_relayed(&self) -> u64 {
        self.nodes.iter().map(|n| n.stats.packets_relayed).sum()
    }

    /// One line per node
    pub fn summary(&self) -> String {
        let mut output = format!("Scenario: {}\n", self.name);
        for node in &self.nodes {
            output.push_str(&format!(
                "  {}: delivered={} duplicates={} relayed={} received={:?}\n",
                node.address,
                node.stats.messages_delivered,
                node.stats.duplicates_dropped,
                node.stats.packets_relayed,
                node.received
            ));
        }
        output
    }
}

/// Nodes of one scenario, each with a recording delegate
struct Harness {
    graph: Arc<TopologyGraph>,
    nodes: Vec<(Arc<NodeSimulator>, Arc<RecordingDelegate>)>,
}

impl Harness {
    fn new(config: &SimConfig, names: &[impl AsRef<str>]) -> Self {
        let graph = TopologyGraph::with_config(config.clone());
        let nodes = names
            .iter()
            .map(|name| {
                let delegate = Arc::new(RecordingDelegate::new());
                let node = NodeSimulator::builder(&graph, name.as_ref())
                    .delegate(delegate.clone())
                    .build();
                node.register();
                (node, delegate)
            })
            .collect();
        Self { graph, nodes }
    }

    fn node(&self, index: usize) -> &Arc<NodeSimulator> {
        &self.nodes[index].0
    }

    fn addresses(&self) -> Vec<PeerAddress> {
        self.nodes.iter().map(|(node, _)| node.address()).collect()
    }

    fn set_flood(&self, enabled: bool) {
        for (node, _) in &self.nodes {
            node.set_flood_enabled(enabled);
        }
    }

    fn report(self, name: &str) -> ScenarioReport {
        for (node, _) in &self.nodes {
            node.drain_self_echoes();
        }

        let nodes = self
            .nodes
            .iter()
            .map(|(node, delegate)| NodeReport {
                address: node.address(),
                received: delegate.contents(),
                stats: node.stats(),
            })
            .collect();

        ScenarioReport {
            name: name.to_string(),
            topology: self.graph.visualize(),
            nodes,
        }
    }
}

fn names(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

/// A - B - C line with flood relay; A broadcasts "hi"
///
/// B delivers once, C delivers once through B's relay, A only sees its own
/// echo.
pub fn line_flood(config: &SimConfig) -> ScenarioReport {
    info!("=== Running Line Flood Scenario ===");

    let harness = Harness::new(config, &["A", "B", "C"]);
    harness.graph.connect_line(&harness.addresses());
    harness.set_flood(true);
    println!("{}", harness.graph.visualize());

    println!("--- A broadcasts \"hi\" ---");
    harness.node(0).send(OutgoingMessage::broadcast("hi"));

    harness.report("line_flood")
}

/// X sends a private message to an unconnected Y
///
/// The unicast shortcut hands it to Y directly; nobody else is involved.
pub fn private_oracle(config: &SimConfig) -> ScenarioReport {
    info!("=== Running Private Oracle Scenario ===");

    let harness = Harness::new(config, &["X", "Y"]);
    println!("{}", harness.graph.visualize());

    println!("--- X sends a private message to Y (no link) ---");
    harness
        .node(0)
        .send(OutgoingMessage::to("Y", "for your eyes only"));

    harness.report("private_oracle")
}

/// Hub and `spokes` leaves with flood relay
///
/// The hub broadcasts, then the first spoke broadcasts and the hub relays
/// to the remaining spokes.
pub fn star_broadcast(config: &SimConfig, spokes: usize) -> ScenarioReport {
    info!(spokes, "=== Running Star Broadcast Scenario ===");

    let mut all = vec!["HUB".to_string()];
    all.extend(names("S", spokes));
    let harness = Harness::new(config, &all);
    let addresses = harness.addresses();
    harness.graph.connect_star(&addresses[0], &addresses[1..]);
    harness.set_flood(true);
    println!("{}", harness.graph.visualize());

    println!("--- HUB broadcasts ---");
    harness
        .node(0)
        .send(OutgoingMessage::broadcast("from the hub"));

    if spokes > 0 {
        println!("--- S1 broadcasts, HUB relays ---");
        harness
            .node(1)
            .send(OutgoingMessage::broadcast("from a spoke"));
    }

    harness.report("star_broadcast")
}

/// Unicast to a recipient that is not adjacent to the sender
///
/// ```text
/// B - A - C      R (unlinked)
/// ```
///
/// R receives through the direct shortcut and B and C each get a relay copy.
pub fn unicast_fallback(config: &SimConfig) -> ScenarioReport {
    info!("=== Running Unicast Fallback Scenario ===");

    let harness = Harness::new(config, &["A", "B", "C", "R"]);
    let a = harness.node(0);
    a.connect_to("B");
    a.connect_to("C");
    println!("{}", harness.graph.visualize());

    println!("--- A sends to R, which is not a neighbor ---");
    a.send(OutgoingMessage::to("R", "find R"));

    println!("--- A sends to B, which is a neighbor ---");
    a.send(OutgoingMessage::to("B", "just B"));

    harness.report("unicast_fallback")
}

/// Ring of `size` nodes with flood relay; the first node broadcasts
///
/// Every other node delivers exactly once even though the flood reaches it
/// from both directions.
pub fn ring_flood(config: &SimConfig, size: usize) -> ScenarioReport {
    info!(size, "=== Running Ring Flood Scenario ===");

    let harness = Harness::new(config, &names("N", size));
    harness.graph.connect_ring(&harness.addresses());
    harness.set_flood(true);
    println!("{}", harness.graph.visualize());

    if size > 0 {
        println!("--- N1 floods the ring ---");
        harness
            .node(0)
            .send(OutgoingMessage::broadcast("around the ring"));
    }

    harness.report("ring_flood")
}
