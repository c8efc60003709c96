//! Topology graph for the mesh simulator
//!
//! Holds the undirected adjacency between simulated nodes and the registry
//! from logical [`PeerAddress`] to [`NodeId`]. The graph routes packets but
//! never owns nodes: it keeps weak handles, and a dropped node removes its
//! own address, links and handle.
//!
//! Routing snapshots the target nodes under the read lock and releases it
//! before calling into them. Fan-out is reentrant: a receiving node reads
//! the graph again to relay.
//!
//! Topology helpers build the usual shapes over registered addresses:
//! - Line: A - B - C
//! - Ring: A - B - C - A
//! - Star: hub connected to every spoke
//! - Full mesh: every pair connected
//! - Random: seeded connection probability

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use meshsim_core::{NodeId, Packet, PeerAddress};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::node::NodeSimulator;

#[derive(Default)]
struct GraphState {
    /// Address to node, last write wins
    registry: BTreeMap<PeerAddress, NodeId>,
    /// Symmetric adjacency
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    nodes: BTreeMap<NodeId, Weak<NodeSimulator>>,
}

impl GraphState {
    fn upgrade_all(&self, ids: impl IntoIterator<Item = NodeId>) -> Vec<Arc<NodeSimulator>> {
        ids.into_iter()
            .filter_map(|id| self.nodes.get(&id).and_then(Weak::upgrade))
            .collect()
    }

    fn neighbor_ids(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.adjacency.get(&node).cloned().unwrap_or_default()
    }
}

/// Shared network topology
pub struct TopologyGraph {
    state: RwLock<GraphState>,
    next_id: AtomicU64,
    config: SimConfig,
}

impl TopologyGraph {
    /// Create an empty graph with the default configuration
    pub fn new() -> Arc<Self> {
        Self::with_config(SimConfig::default())
    }

    /// Create an empty graph whose nodes inherit `config`
    pub fn with_config(config: SimConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(GraphState::default()),
            next_id: AtomicU64::new(1),
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Hand out the next node identity for this graph
    pub(crate) fn allocate_node_id(&self) -> NodeId {
        NodeId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `node` under `address`
    ///
    /// Overwrites any previous owner of the address. The node keeps its
    /// existing edges and adopts `address` as its own.
    pub fn register(&self, node: &Arc<NodeSimulator>, address: impl Into<PeerAddress>) {
        let address = address.into();
        node.bind(address.clone());
        self.insert(node.id(), Arc::downgrade(node), address);
    }

    pub(crate) fn insert(&self, id: NodeId, node: Weak<NodeSimulator>, address: PeerAddress) {
        let mut state = self.state.write();

        // A node answers to a single address
        state
            .registry
            .retain(|existing, owner| *owner != id || *existing == address);

        if let Some(previous) = state.registry.insert(address.clone(), id)
            && previous != id
        {
            info!(%address, %previous, node = %id, "address re-registered");
        } else {
            debug!(%address, node = %id, "node registered");
        }

        state.nodes.insert(id, node);
        state.adjacency.entry(id).or_default();
    }

    /// Forget a node: its handle, the addresses it owns and every link
    pub(crate) fn remove(&self, id: NodeId) {
        let mut state = self.state.write();
        if state.nodes.remove(&id).is_none() {
            return;
        }
        state.registry.retain(|_, owner| *owner != id);
        if let Some(neighbors) = state.adjacency.remove(&id) {
            for neighbor in neighbors {
                if let Some(set) = state.adjacency.get_mut(&neighbor) {
                    set.remove(&id);
                }
            }
        }
        debug!(node = %id, "node removed");
    }

    /// Add an undirected link between two registered addresses
    ///
    /// No-op when either address is unknown or both are the same node.
    pub fn connect(&self, a: &PeerAddress, b: &PeerAddress) {
        let mut state = self.state.write();
        let (Some(&id_a), Some(&id_b)) = (state.registry.get(a), state.registry.get(b)) else {
            debug!(%a, %b, "connect ignored, address not registered");
            return;
        };
        if id_a == id_b {
            return; // No self-loops
        }

        let added = state.adjacency.entry(id_a).or_default().insert(id_b);
        state.adjacency.entry(id_b).or_default().insert(id_a);
        if added {
            info!(%a, %b, "link up");
        }
    }

    /// Remove the link between two addresses, if any
    pub fn disconnect(&self, a: &PeerAddress, b: &PeerAddress) {
        let mut state = self.state.write();
        let (Some(&id_a), Some(&id_b)) = (state.registry.get(a), state.registry.get(b)) else {
            return;
        };

        let removed = state
            .adjacency
            .get_mut(&id_a)
            .is_some_and(|set| set.remove(&id_b));
        if let Some(set) = state.adjacency.get_mut(&id_b) {
            set.remove(&id_a);
        }
        if removed {
            info!(%a, %b, "link down");
        }
    }

    /// Whether two nodes share a link
    pub fn is_direct_neighbor(&self, a: NodeId, b: NodeId) -> bool {
        self.state
            .read()
            .adjacency
            .get(&a)
            .is_some_and(|set| set.contains(&b))
    }

    /// Whether two addresses resolve to linked nodes
    pub fn are_linked(&self, a: &PeerAddress, b: &PeerAddress) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(a), Some(b)) => self.is_direct_neighbor(a, b),
            _ => false,
        }
    }

    /// Current neighbors of a node
    pub fn neighbors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.state.read().neighbor_ids(node)
    }

    /// Node currently registered under `address`
    pub fn resolve(&self, address: &PeerAddress) -> Option<NodeId> {
        self.state.read().registry.get(address).copied()
    }

    /// Address a node is registered under
    pub fn address_of(&self, node: NodeId) -> Option<PeerAddress> {
        self.state
            .read()
            .registry
            .iter()
            .find(|(_, id)| **id == node)
            .map(|(address, _)| address.clone())
    }

    /// Live handle to a node, if it has not been dropped
    pub fn node(&self, node: NodeId) -> Option<Arc<NodeSimulator>> {
        self.state.read().nodes.get(&node).and_then(Weak::upgrade)
    }

    /// Live handle to the node registered under `address`
    pub fn node_by_address(&self, address: &PeerAddress) -> Option<Arc<NodeSimulator>> {
        let state = self.state.read();
        let id = state.registry.get(address)?;
        state.nodes.get(id).and_then(Weak::upgrade)
    }

    /// Live neighbor handles, in node id order
    pub fn neighbor_nodes(&self, node: NodeId) -> Vec<Arc<NodeSimulator>> {
        let state = self.state.read();
        state.upgrade_all(state.neighbor_ids(node))
    }

    /// Deliver `packet` to every neighbor of `sender`
    ///
    /// TTL is left untouched; the sender never receives its own packet.
    pub fn route_broadcast(&self, packet: &Packet, sender: NodeId) {
        let targets = self.neighbor_nodes(sender);
        debug!(
            from = %packet.sender_id,
            targets = targets.len(),
            "routing broadcast"
        );

        for node in targets {
            node.receive_incoming_packet(packet);
        }
    }

    /// Deliver `packet` addressed to `recipient`
    ///
    /// A recipient adjacent to the sender gets the packet alone. Otherwise
    /// a registered recipient gets it directly regardless of adjacency, and
    /// every other neighbor of the sender gets a copy to relay.
    pub fn route_unicast(&self, packet: &Packet, sender: NodeId, recipient: &PeerAddress) {
        let targets = {
            let state = self.state.read();
            let neighbors = state.neighbor_ids(sender);
            match state.registry.get(recipient).copied() {
                Some(target) if neighbors.contains(&target) => state.upgrade_all([target]),
                Some(target) => {
                    let relays = neighbors.into_iter().filter(|id| *id != target);
                    state.upgrade_all(std::iter::once(target).chain(relays))
                }
                None => state.upgrade_all(neighbors),
            }
        };

        debug!(
            from = %packet.sender_id,
            to = %recipient,
            targets = targets.len(),
            "routing unicast"
        );

        for node in targets {
            node.receive_incoming_packet(packet);
        }
    }

    /// Number of registered nodes
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Number of undirected links
    pub fn edge_count(&self) -> usize {
        self.state
            .read()
            .adjacency
            .values()
            .map(BTreeSet::len)
            .sum::<usize>()
            / 2
    }

    /// Registered addresses, sorted
    pub fn addresses(&self) -> Vec<PeerAddress> {
        self.state.read().registry.keys().cloned().collect()
    }

    /// Addresses linked to both `a` and `b`
    pub fn mutual_neighbors(&self, a: &PeerAddress, b: &PeerAddress) -> Vec<PeerAddress> {
        let state = self.state.read();
        let (Some(&id_a), Some(&id_b)) = (state.registry.get(a), state.registry.get(b)) else {
            return Vec::new();
        };
        let common: BTreeSet<NodeId> = state
            .neighbor_ids(id_a)
            .intersection(&state.neighbor_ids(id_b))
            .copied()
            .collect();

        state
            .registry
            .iter()
            .filter(|(_, id)| common.contains(id))
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Connect consecutive addresses
    ///
    /// A - B - C - D
    pub fn connect_line(&self, addresses: &[PeerAddress]) {
        for pair in addresses.windows(2) {
            self.connect(&pair[0], &pair[1]);
        }
    }

    /// Connect consecutive addresses and close the loop
    ///
    /// A - B - C - D - A
    pub fn connect_ring(&self, addresses: &[PeerAddress]) {
        self.connect_line(addresses);
        if addresses.len() > 2
            && let (Some(first), Some(last)) = (addresses.first(), addresses.last())
        {
            self.connect(last, first);
        }
    }

    /// Connect `hub` to every spoke
    pub fn connect_star(&self, hub: &PeerAddress, spokes: &[PeerAddress]) {
        for spoke in spokes {
            self.connect(hub, spoke);
        }
    }

    /// Connect every pair of addresses
    pub fn connect_full(&self, addresses: &[PeerAddress]) {
        for (i, a) in addresses.iter().enumerate() {
            for b in &addresses[i + 1..] {
                self.connect(a, b);
            }
        }
    }

    /// Connect each pair with the given probability, reproducibly for a seed
    ///
    /// Unregistered addresses are skipped. Every registered address ends up
    /// with at least one link when two or more of them are given.
    pub fn connect_random(&self, addresses: &[PeerAddress], probability: f64, seed: u64) {
        let addresses: Vec<PeerAddress> = addresses
            .iter()
            .filter(|address| self.resolve(address).is_some())
            .cloned()
            .collect();
        let mut rng = StdRng::seed_from_u64(seed);

        for (i, a) in addresses.iter().enumerate() {
            for b in &addresses[i + 1..] {
                if rng.random::<f64>() < probability {
                    self.connect(a, b);
                }
            }
        }

        if addresses.len() < 2 {
            return;
        }
        for (i, address) in addresses.iter().enumerate() {
            let isolated = self
                .resolve(address)
                .is_some_and(|id| self.neighbors(id).is_empty());
            if isolated {
                // Pick any other registered address
                let offset = rng.random_range(1..addresses.len());
                let other = &addresses[(i + offset) % addresses.len()];
                self.connect(address, other);
            }
        }
    }

    /// Text rendering of the adjacency, one line per registered address
    pub fn visualize(&self) -> String {
        let state = self.state.read();
        let names: BTreeMap<NodeId, &PeerAddress> =
            state.registry.iter().map(|(address, id)| (*id, address)).collect();

        let mut output = String::new();
        output.push_str("Mesh Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", state.nodes.len()));
        output.push_str(&format!(
            "  Edges: {}\n\n",
            state.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
        ));

        for (address, id) in &state.registry {
            let neighbor_str: Vec<String> = state
                .neighbor_ids(*id)
                .iter()
                .map(|n| match names.get(n) {
                    Some(name) => name.to_string(),
                    None => n.to_string(),
                })
                .collect();
            output.push_str(&format!("  {} -> [{}]\n", address, neighbor_str.join(", ")));
        }
        output
    }
}
