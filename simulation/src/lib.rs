//! # Mesh Simulator
//!
//! A deterministic, in-process simulator of a multi-hop mesh network, used
//! to drive protocol-level test scenarios without radio hardware.
//!
//! ## Overview
//!
//! - **Topology graph** (`topology.rs`): undirected links between nodes and
//!   the address registry; fans packets out to neighbors
//! - **Node simulator** (`node.rs`): send, receive, dedup and flood relay
//!   for one participant
//! - **Self-echo** (`echo.rs`): the sender's own copy, delivered after
//!   `send()` returns
//! - **Scenarios** (`scenarios.rs`): pre-built runs used by the CLI
//!
//! Two delivery modes are modelled:
//!
//! - **Broadcast flooding**: every neighbor receives; nodes with flood relay
//!   enabled forward public broadcasts with a decremented TTL, and each node
//!   delivers a given message id at most once
//! - **Unicast**: an adjacent recipient receives directly; otherwise the
//!   recipient is reached anyway and every neighbor of the sender gets a
//!   relay copy
//!
//! Everything except the self-echo happens synchronously inside the call
//! that triggered it.
//!
//! ## Example: A-B-C line
//!
//! ```rust,ignore
//! use meshsim::*;
//!
//! let graph = TopologyGraph::new();
//! let a = NodeSimulator::new(&graph, "A");
//! let b = NodeSimulator::new(&graph, "B");
//! let c = NodeSimulator::new(&graph, "C");
//! for node in [&a, &b, &c] {
//!     node.register();
//!     node.set_flood_enabled(true);
//! }
//! a.connect_to("B");
//! b.connect_to("C");
//!
//! // B delivers, relays to C; A never sees its own flood
//! a.send(OutgoingMessage::broadcast("hi"));
//! ```

pub mod config;
pub mod echo;
pub mod error;
pub mod node;
pub mod scenarios;
pub mod stats;
pub mod topology;

#[cfg(test)]
mod integration_scenarios;

pub use config::SimConfig;
pub use echo::SelfEchoQueue;
pub use error::{ConfigError, ConfigResult};
pub use node::{
    MessageObserver, NodeSimulator, NodeSimulatorBuilder, OutgoingMessage, PacketObserver,
    SentRecord,
};
pub use scenarios::{NodeReport, ScenarioReport};
pub use stats::{NodeStats, NodeStatsSnapshot};
pub use topology::TopologyGraph;
