//! Node context injection for multi-node logging
//!
//! Every simulated node runs on the caller's thread, so a single flood can
//! pass through many nodes within one call stack. This module keeps the
//! address of the node currently handling a packet in thread-local storage
//! so log entries can be attributed to it.

use std::cell::RefCell;

use meshsim_core::PeerAddress;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone)]
pub struct NodeContextData {
    /// The node's address
    pub address: String,
    /// Unique id for this context scope
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Sets the node context for the current thread and restores the previous
/// context (if any) when dropped. Guards nest, which mirrors a relay chain
/// recursing from node to node.
///
/// # Example
///
/// ```ignore
/// use meshsim_logging::NodeContextGuard;
/// use meshsim_core::PeerAddress;
///
/// let _guard = NodeContextGuard::new(&PeerAddress::new("A"));
/// tracing::info!("Processing packet"); // attributed to A
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Enter the context of the given node
    pub fn new(address: &PeerAddress) -> Self {
        Self::with_instance_id(address, Uuid::new_v4())
    }

    /// Enter the context with a specific instance id
    pub fn with_instance_id(address: &PeerAddress, instance_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = NodeContextData {
            address: address.to_string(),
            instance_id,
        };

        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// Get the current node address (if set)
    pub fn current_address() -> Option<String> {
        Self::current().map(|ctx| ctx.address)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}
