// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// A link from an output port to an input port.
///
/// The target depends on the source: the source runs first in every phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Producing node
    pub source: NodeId,
    /// Output index on the producing node
    pub source_port: usize,
    /// Consuming node
    pub target: NodeId,
    /// Input index on the consuming node
    pub target_port: usize,
}

impl Link {
    /// Create a new link
    pub fn new(source: NodeId, source_port: usize, target: NodeId, target_port: usize) -> Self {
        Self {
            id: LinkId::new(),
            source,
            source_port,
            target,
            target_port,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Check if this link feeds a specific input
    pub fn feeds(&self, target: NodeId, target_port: usize) -> bool {
        self.target == target && self.target_port == target_port
    }

    /// Endpoints without the link ID, handy for comparing graphs
    pub fn endpoints(&self) -> (NodeId, usize, NodeId, usize) {
        (self.source, self.source_port, self.target, self.target_port)
    }
}
