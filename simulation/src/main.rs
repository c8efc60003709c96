//! Mesh simulator CLI
//!
//! Runs the pre-built scenarios, renders topologies and offers an
//! interactive shell for poking at a live mesh.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use meshsim_core::{PeerAddress, RecordingDelegate};
use meshsim_logging::{LogConfig, MeshSubscriberBuilder};
use tracing::info;

use meshsim::{NodeSimulator, OutgoingMessage, ScenarioReport, SimConfig, TopologyGraph, scenarios};

#[derive(Parser)]
#[command(
    name = "meshsim",
    about = "Deterministic mesh network simulator with flood and unicast delivery",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines instead of pretty text
    #[arg(long, global = true)]
    json: bool,

    /// Load simulator settings from a JSON file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// A - B - C line, A floods "hi"
    LineFlood,

    /// Private message between two unconnected nodes
    PrivateOracle,

    /// Hub-and-spoke broadcast
    StarBroadcast {
        /// Number of spokes
        #[arg(short, long, default_value = "4")]
        spokes: usize,
    },

    /// Unicast to a recipient that is not a neighbor
    UnicastFallback,

    /// Flood around a ring
    RingFlood {
        /// Number of nodes in the ring
        #[arg(short, long, default_value = "6")]
        size: usize,
    },

    /// Build and visualize a topology
    Topology {
        #[arg(short, long, value_enum, default_value = "ring")]
        shape: Shape,

        /// Number of nodes
        #[arg(short, long, default_value = "6")]
        nodes: usize,

        /// Connection probability for the random shape
        #[arg(short, long, default_value = "0.4")]
        probability: f64,

        /// Seed for the random shape
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Interactive simulation mode
    Interactive {
        /// Number of nodes
        #[arg(short, long, default_value = "5")]
        nodes: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Line,
    Ring,
    Star,
    Full,
    Random,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig {
            console: meshsim_logging::ConsoleConfig {
                pretty: true,
                ..Default::default()
            },
            ..Default::default()
        }
    };
    if cli.json {
        log_config.console.pretty = false;
    }
    let _guard = MeshSubscriberBuilder::new().with_config(log_config).try_init()?;

    let config = match &cli.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };
    info!(?config, "simulator configured");

    match cli.command {
        Commands::LineFlood => print_report(&scenarios::line_flood(&config)),
        Commands::PrivateOracle => print_report(&scenarios::private_oracle(&config)),
        Commands::StarBroadcast { spokes } => {
            print_report(&scenarios::star_broadcast(&config, spokes))
        }
        Commands::UnicastFallback => print_report(&scenarios::unicast_fallback(&config)),
        Commands::RingFlood { size } => print_report(&scenarios::ring_flood(&config, size)),
        Commands::Topology {
            shape,
            nodes,
            probability,
            seed,
        } => {
            let (graph, nodes) = spawn_nodes(&config, nodes);
            connect_shape(&graph, &nodes, shape, probability, seed);
            println!("{}", graph.visualize());
        }
        Commands::Interactive { nodes } => run_interactive(&config, nodes)?,
    }

    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("\n{}", report.summary());
}

type Spawned = Vec<(Arc<NodeSimulator>, Arc<RecordingDelegate>)>;

fn spawn_nodes(config: &SimConfig, count: usize) -> (Arc<TopologyGraph>, Spawned) {
    let graph = TopologyGraph::with_config(config.clone());
    let nodes = (0..count)
        .map(|i| {
            let delegate = Arc::new(RecordingDelegate::new());
            let node = NodeSimulator::builder(&graph, node_name(i))
                .delegate(delegate.clone())
                .build();
            node.register();
            (node, delegate)
        })
        .collect();
    (graph, nodes)
}

/// A, B, ..., Z, then N26, N27, ...
fn node_name(index: usize) -> String {
    if index < 26 {
        ((b'A' + index as u8) as char).to_string()
    } else {
        format!("N{index}")
    }
}

/// Link spawned nodes in creation order
fn connect_shape(
    graph: &TopologyGraph,
    nodes: &Spawned,
    shape: Shape,
    probability: f64,
    seed: u64,
) {
    let addresses: Vec<PeerAddress> = nodes.iter().map(|(node, _)| node.address()).collect();
    match shape {
        Shape::Line => graph.connect_line(&addresses),
        Shape::Ring => graph.connect_ring(&addresses),
        Shape::Star => {
            if let Some((hub, spokes)) = addresses.split_first() {
                graph.connect_star(hub, spokes);
            }
        }
        Shape::Full => graph.connect_full(&addresses),
        Shape::Random => graph.connect_random(&addresses, probability, seed),
    }
}

fn run_interactive(config: &SimConfig, count: usize) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (graph, nodes) = spawn_nodes(config, count);
    connect_shape(&graph, &nodes, Shape::Ring, 0.0, 0);
    println!("{}", graph.visualize());

    let find = |name: &str| {
        let address = PeerAddress::new(name.to_ascii_uppercase());
        nodes.iter().find(|(node, _)| node.address() == address)
    };

    println!("\nInteractive mode. Commands:");
    println!("  link <a> <b>        - Connect two nodes");
    println!("  unlink <a> <b>      - Disconnect two nodes");
    println!("  flood <node> on|off - Toggle flood relay");
    println!("  send <from> <msg>   - Broadcast a message");
    println!("  dm <from> <to> <msg> - Send a private message");
    println!("  status              - Show topology and per-node stats");
    println!("  quit                - Exit");
    println!();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(command) = parts.first() else {
            continue;
        };

        match *command {
            "link" | "unlink" => match (parts.get(1).and_then(|n| find(*n)), parts.get(2)) {
                (Some((node, _)), Some(other)) => {
                    let other = other.to_ascii_uppercase();
                    if *command == "link" {
                        node.connect_to(other.as_str());
                    } else {
                        node.disconnect_from(other.as_str());
                    }
                    println!("  {} peers: {:?}", node.address(), node.list_peers());
                }
                _ => println!("  Usage: {command} <a> <b>"),
            },
            "flood" => match (parts.get(1).and_then(|n| find(*n)), parts.get(2)) {
                (Some((node, _)), Some(state)) => {
                    node.set_flood_enabled(*state == "on");
                    println!("  {} flood relay: {}", node.address(), node.flood_enabled());
                }
                _ => println!("  Usage: flood <node> on|off"),
            },
            "send" if parts.len() >= 3 => match find(parts[1]) {
                Some((node, _)) => {
                    let message = node.send(OutgoingMessage::broadcast(parts[2..].join(" ")));
                    node.drain_self_echoes();
                    println!("  Sent {}", message.id);
                }
                None => println!("  Unknown node: {}", parts[1]),
            },
            "dm" if parts.len() >= 4 => match find(parts[1]) {
                Some((node, _)) => {
                    let recipient = parts[2].to_ascii_uppercase();
                    let message =
                        node.send(OutgoingMessage::to(recipient.as_str(), parts[3..].join(" ")));
                    node.drain_self_echoes();
                    println!("  Sent {} to {}", message.id, recipient);
                }
                None => println!("  Unknown node: {}", parts[1]),
            },
            "send" | "dm" => println!("  Usage: send <from> <msg> | dm <from> <to> <msg>"),
            "status" => {
                println!("{}", graph.visualize());
                for (node, delegate) in &nodes {
                    let stats = node.stats();
                    println!(
                        "  {} - delivered {} / duplicates {} / relayed {} / inbox {:?}",
                        node.address(),
                        stats.messages_delivered,
                        stats.duplicates_dropped,
                        stats.packets_relayed,
                        delegate.contents()
                    );
                }
            }
            "quit" | "exit" | "q" => break,
            other => println!("  Unknown command: {other}"),
        }
    }

    Ok(())
}
