//! Per-node context for multi-node logging
//!
//! A simulation runs many nodes on one thread. [`NodeContextGuard`] marks
//! which node the current code is acting for, so spans created in that
//! scope can be attributed to it.

use std::cell::RefCell;

use meshroute_core::NodeAddr;
use uuid::Uuid;

/// Node context stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// The node's address
    pub node: NodeAddr,
    /// Human label (a peer letter in simulations)
    pub label: String,
    /// Unique id of this engine instance
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Creating the guard sets the node context for the current thread;
/// dropping it restores whatever was set before, so guards nest.
///
/// # Example
///
/// ```ignore
/// use meshroute_logging::NodeContextGuard;
///
/// let _guard = NodeContextGuard::new(addr);
/// tracing::info!("Route installed");
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    /// Set the context to `node`, labelled with its address
    pub fn new(node: NodeAddr) -> Self {
        Self::with_label(node, node.to_string())
    }

    /// Set the context to `node` with a custom label
    pub fn with_label(node: NodeAddr, label: impl Into<String>) -> Self {
        Self::install(NodeContextData {
            node,
            label: label.into(),
            instance_id: Uuid::new_v4(),
        })
    }

    /// Set the context with a fixed instance id
    ///
    /// Keeps one id for a node across restarts.
    pub fn with_instance_id(node: NodeAddr, label: impl Into<String>, instance_id: Uuid) -> Self {
        Self::install(NodeContextData {
            node,
            label: label.into(),
            instance_id,
        })
    }

    fn install(data: NodeContextData) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// The current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    /// The current node address (if set)
    pub fn current_node() -> Option<NodeAddr> {
        Self::current().map(|ctx| ctx.node)
    }

    /// The current instance id (if set)
    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with a node context set
///
/// ```ignore
/// with_node_context!(addr, {
///     tracing::info!("Processing packet");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node);
        $body
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> NodeAddr {
        NodeAddr::new(10, 0, 0, last)
    }

    #[test]
    fn test_node_context_guard() {
        assert!(NodeContextGuard::current().is_none());

        {
            let _guard = NodeContextGuard::with_label(addr(1), "A");
            let ctx = NodeContextGuard::current().unwrap();
            assert_eq!(ctx.node, addr(1));
            assert_eq!(ctx.label, "A");
        }

        assert!(NodeContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        {
            let _guard_a = NodeContextGuard::new(addr(1));
            assert_eq!(NodeContextGuard::current_node(), Some(addr(1)));

            {
                let _guard_b = NodeContextGuard::new(addr(2));
                assert_eq!(NodeContextGuard::current_node(), Some(addr(2)));
            }

            assert_eq!(NodeContextGuard::current_node(), Some(addr(1)));
        }

        assert!(NodeContextGuard::current_node().is_none());
    }

    #[test]
    fn test_default_label_is_address() {
        let _guard = NodeContextGuard::new(addr(7));
        assert_eq!(NodeContextGuard::current().unwrap().label, "10.0.0.7");
    }

    #[test]
    fn test_with_instance_id() {
        let instance_id = Uuid::new_v4();
        let _guard = NodeContextGuard::with_instance_id(addr(3), "C", instance_id);
        assert_eq!(NodeContextGuard::current_instance_id(), Some(instance_id));
    }

    #[test]
    fn test_macro_scopes_context() {
        let seen = with_node_context!(addr(4), { NodeContextGuard::current_node() });
        assert_eq!(seen, Some(addr(4)));
        assert!(NodeContextGuard::current_node().is_none());
    }
}
