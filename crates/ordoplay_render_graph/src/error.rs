// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for graph editing, validation and frame execution.

use crate::node::NodeId;
use crate::port::{PortDirection, PortType};
use crate::scheduler::FramePhase;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Structural errors raised while editing, validating, loading or ordering a graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No node class is registered under this name
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The node is not present in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A link endpoint does not belong to this graph
    #[error("Node is not part of this graph: {0}")]
    NodeNotInGraph(NodeId),

    /// A port index does not exist on the node
    #[error("{direction:?} port {index} out of range on node {node} ({count} ports)")]
    PortIndexOutOfRange {
        /// Node owning the port list
        node: NodeId,
        /// Which port list was indexed
        direction: PortDirection,
        /// Offending index
        index: usize,
        /// Number of ports the node currently has
        count: usize,
    },

    /// The output type cannot feed the input type
    #[error("Port type mismatch: {source_type} cannot feed {target_type}")]
    PortTypeMismatch {
        /// Type of the producing output
        source_type: PortType,
        /// Type of the consuming input
        target_type: PortType,
    },

    /// The link set contains a cycle
    #[error("Graph contains a cycle through {} node(s)", nodes.len())]
    CyclicGraph {
        /// Nodes that could not be ordered (cycle members and everything downstream of them)
        nodes: Vec<NodeId>,
    },

    /// The pipeline description could not be interpreted
    #[error("Malformed graph description: {0}")]
    MalformedGraphDescription(String),

    /// A required input has no incoming link
    #[error("Required input {port} of node {node} is not linked")]
    RequiredInputUnbound {
        /// Node owning the input
        node: NodeId,
        /// Input index
        port: usize,
    },

    /// Port count was changed on a node with a fixed port list
    #[error("{direction:?} port count of node {node} is fixed")]
    PortCountFixed {
        /// Node that was resized
        node: NodeId,
        /// Which port list was resized
        direction: PortDirection,
    },

    /// A port list was resized beyond [`MAX_PORTS`](crate::graph::MAX_PORTS)
    #[error("{direction:?} port count {count} of node {node} exceeds the limit")]
    TooManyPorts {
        /// Node that was resized
        node: NodeId,
        /// Which port list was resized
        direction: PortDirection,
        /// Requested count
        count: usize,
    },

    /// The graph could not be encoded
    #[error("Failed to encode graph description: {0}")]
    Encode(String),
}

/// Failure reported by a node body during Setup or Execute
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A linked input carries no value this frame
    #[error("Input {0} has no value this frame")]
    MissingInput(usize),

    /// An input carries a value of the wrong kind
    #[error("Input {index} carries {found}, expected {expected}")]
    UnexpectedValue {
        /// Input index
        index: usize,
        /// Expected port type
        expected: PortType,
        /// Type of the value found
        found: PortType,
    },

    /// Engine-level failure (resource allocation)
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Custom error
    #[error("{0}")]
    Custom(String),
}

/// Errors from the engine context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    /// The context was used after shutdown
    #[error("Engine context has been shut down")]
    ShutDown,
}

/// Errors that abort a frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The graph could not be scheduled
    #[error("Frame aborted: {0}")]
    Graph(#[from] GraphError),

    /// A node failed
    #[error("Node {node} failed during {phase}: {error}")]
    Node {
        /// Failing node
        node: NodeId,
        /// Phase that was running
        phase: FramePhase,
        /// Underlying node error
        #[source]
        error: NodeError,
    },

    /// The engine context cannot run frames
    #[error(transparent)]
    Engine(#[from] EngineError),
}
