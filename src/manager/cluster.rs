//! Cluster-wide messaging between task managers.
//!
//! The transport is supplied by the host. [`LocalMessageHub`] wires several
//! managers together inside one process.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::task::TaskId;

/// Identifies one node of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Cancel the task with this id on whichever node is running it
    CancelTask(TaskId),
}

impl ClusterMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            ClusterMessage::CancelTask(_) => "task-cancel",
        }
    }
}

pub trait ClusterMessageListener: Send + Sync {
    fn receive(&self, message: &ClusterMessage, sender: NodeId);
}

/// Reliable broadcast to every other node of the cluster
pub trait MessageBus: Send + Sync {
    fn node_id(&self) -> NodeId;

    fn register_listener(&self, listener: Arc<dyn ClusterMessageListener>);

    fn broadcast(&self, message: ClusterMessage);
}

type NodeList = RwLock<Vec<Weak<LocalNode>>>;

/// In-process message hub. Each call to [`LocalMessageHub::node`] joins a
/// new node; a broadcast is delivered synchronously to the listeners of
/// every other live node.
#[derive(Clone, Default)]
pub struct LocalMessageHub {
    nodes: Arc<NodeList>,
}

impl LocalMessageHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self) -> Arc<LocalNode> {
        let node = Arc::new(LocalNode {
            id: NodeId::new(),
            listeners: RwLock::new(Vec::new()),
            nodes: self.nodes.clone(),
        });
        let mut nodes = self.nodes.write();
        nodes.retain(|n| n.strong_count() > 0);
        nodes.push(Arc::downgrade(&node));
        node
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().iter().filter(|n| n.strong_count() > 0).count()
    }
}

/// One node's view of a [`LocalMessageHub`]
pub struct LocalNode {
    id: NodeId,
    listeners: RwLock<Vec<Arc<dyn ClusterMessageListener>>>,
    nodes: Arc<NodeList>,
}

impl LocalNode {
    fn deliver(&self, message: &ClusterMessage, sender: NodeId) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.receive(message, sender);
        }
    }
}

impl MessageBus for LocalNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn register_listener(&self, listener: Arc<dyn ClusterMessageListener>) {
        self.listeners.write().push(listener);
    }

    fn broadcast(&self, message: ClusterMessage) {
        let peers: Vec<Arc<LocalNode>> = self
            .nodes
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|n| n.id != self.id)
            .collect();

        debug!(
            channel = message.channel(),
            sender = %self.id,
            peers = peers.len(),
            "Broadcasting cluster message"
        );
        for peer in peers {
            peer.deliver(&message, self.id);
        }
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode")
            .field("id", &self.id)
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Inbox(Mutex<Vec<(ClusterMessage, NodeId)>>);

    impl ClusterMessageListener for Inbox {
        fn receive(&self, message: &ClusterMessage, sender: NodeId) {
            self.0.lock().push((message.clone(), sender));
        }
    }

    #[test]
    fn test_broadcast_reaches_other_nodes_only() {
        let hub = LocalMessageHub::new();
        let a = hub.node();
        let b = hub.node();
        let a_inbox = Arc::new(Inbox(Mutex::new(Vec::new())));
        let b_inbox = Arc::new(Inbox(Mutex::new(Vec::new())));
        a.register_listener(a_inbox.clone());
        b.register_listener(b_inbox.clone());

        a.broadcast(ClusterMessage::CancelTask(42));

        assert!(a_inbox.0.lock().is_empty());
        assert_eq!(*b_inbox.0.lock(), vec![(ClusterMessage::CancelTask(42), a.node_id())]);
    }

    #[test]
    fn test_dropped_nodes_leave_the_hub() {
        let hub = LocalMessageHub::new();
        let a = hub.node();
        {
            let _b = hub.node();
            assert_eq!(hub.node_count(), 2);
        }
        assert_eq!(hub.node_count(), 1);
        a.broadcast(ClusterMessage::CancelTask(1));
    }

    #[test]
    fn test_message_serializes() {
        let json = serde_json::to_string(&ClusterMessage::CancelTask(7)).unwrap();
        let back: ClusterMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClusterMessage::CancelTask(7));
        assert_eq!(back.channel(), "task-cancel");
    }
}
