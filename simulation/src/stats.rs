//! Per-node delivery statistics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters for one node
///
/// Updated from whichever thread is driving the node, so every counter is
/// an atomic. Read them through [`NodeStats::snapshot`].
#[derive(Debug, Default)]
pub struct NodeStats {
    packets_received: AtomicU64,
    messages_delivered: AtomicU64,
    duplicates_dropped: AtomicU64,
    undecodable_packets: AtomicU64,
    packets_relayed: AtomicU64,
    messages_sent: AtomicU64,
    self_echoes: AtomicU64,
}

impl NodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_undecodable(&self) {
        self.undecodable_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relayed(&self, count: usize) {
        self.packets_relayed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_self_echo(&self) {
        self.self_echoes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            undecodable_packets: self.undecodable_packets.load(Ordering::Relaxed),
            packets_relayed: self.packets_relayed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            self_echoes: self.self_echoes.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a node's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStatsSnapshot {
    /// Every packet arrival, including duplicates and undecodable ones
    pub packets_received: u64,
    /// Messages handed to the delegate (first arrival of an id)
    pub messages_delivered: u64,
    pub duplicates_dropped: u64,
    pub undecodable_packets: u64,
    /// Packets forwarded to neighbors by flood relay
    pub packets_relayed: u64,
    pub messages_sent: u64,
    pub self_echoes: u64,
}

impl NodeStatsSnapshot {
    /// Fraction of arrivals absorbed by the dedup cache
    pub fn duplicate_rate(&self) -> f64 {
        if self.packets_received == 0 {
            0.0
        } else {
            self.duplicates_dropped as f64 / self.packets_received as f64
        }
    }
}
