// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON pipeline description.
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "Forward",
//!   "nodes": [{ "id": "…", "class": "Blend", "name": "Composite", "inputs": 3 }],
//!   "links": [{ "src": "Main Color", "srcp": 0, "dst": "Composite", "dstp": "Layer 1" }]
//! }
//! ```
//!
//! Links name their endpoints by node id or by unique node name, and ports by
//! index or by port name. Port counts are only written for nodes with variable
//! ports.

use crate::error::{GraphError, Result};
use crate::graph::{Graph, MAX_PORTS};
use crate::node::NodeId;
use crate::port::PortDirection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Version written by [`Graph::serialize_json`]
pub const FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    FORMAT_VERSION
}

/// Serialized graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Format version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Graph name; the loading graph keeps its own name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nodes in insertion order
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    /// Links
    #[serde(default)]
    pub links: Vec<LinkDescription>,
}

/// Serialized node. At least one of `id` and `name` must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Node id, generated on load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    /// Registered class name
    #[serde(rename = "class")]
    pub class_name: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Input count of a variable-input node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<usize>,
    /// Output count of a variable-output node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<usize>,
}

/// Serialized link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// Source node id or name
    pub src: String,
    /// Source output
    pub srcp: PortRef,
    /// Target node id or name
    pub dst: String,
    /// Target input
    pub dstp: PortRef,
}

/// Port reference by index or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortRef {
    /// Port index
    Index(usize),
    /// Port name
    Name(String),
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

fn malformed(message: impl Into<String>) -> GraphError {
    GraphError::MalformedGraphDescription(message.into())
}

impl Graph {
    /// Describe the graph
    pub fn to_description(&self) -> GraphDescription {
        let nodes = self
            .nodes()
            .map(|node| {
                let body = node.body();
                NodeDescription {
                    id: Some(node.id()),
                    class_name: node.class_name().to_string(),
                    name: Some(node.name().to_string()),
                    inputs: body.has_variable_inputs().then(|| body.num_inputs()),
                    outputs: body.has_variable_outputs().then(|| body.num_outputs()),
                }
            })
            .collect();
        let links = self
            .links()
            .map(|link| LinkDescription {
                src: link.source.to_string(),
                srcp: PortRef::Index(link.source_port),
                dst: link.target.to_string(),
                dstp: PortRef::Index(link.target_port),
            })
            .collect();

        GraphDescription {
            version: FORMAT_VERSION,
            name: Some(self.name.clone()),
            nodes,
            links,
        }
    }

    /// Serialize the graph to pretty-printed JSON
    pub fn serialize_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_description())
            .map_err(|e| GraphError::Encode(e.to_string()))
    }

    /// Replace the graph content with a JSON description.
    ///
    /// The graph is left untouched when the description is rejected.
    pub fn load_json(&mut self, text: &str) -> Result<()> {
        let description: GraphDescription =
            serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        self.load_description(description)
    }

    /// Replace the graph content with a description.
    ///
    /// Everything is resolved into a scratch graph first; the graph keeps its
    /// id and gets a new revision.
    pub fn load_description(&mut self, description: GraphDescription) -> Result<()> {
        if description.version != FORMAT_VERSION {
            return Err(malformed(format!(
                "unsupported version {} (expected {FORMAT_VERSION})",
                description.version
            )));
        }

        let name = description.name.unwrap_or_else(|| self.name.clone());
        let mut scratch = Graph::new(name, Arc::clone(self.registry()));
        let mut names: HashMap<String, Vec<NodeId>> = HashMap::new();

        for (index, node) in description.nodes.iter().enumerate() {
            if node.id.is_none() && node.name.is_none() {
                return Err(malformed(format!("node {index} has neither id nor name")));
            }
            let id = node.id.unwrap_or_default();
            if scratch.contains_node(id) {
                return Err(malformed(format!("duplicate node id {id}")));
            }
            for (direction, count) in [("inputs", node.inputs), ("outputs", node.outputs)] {
                if let Some(count) = count.filter(|&count| count > MAX_PORTS) {
                    return Err(malformed(format!(
                        "node {index} asks for {count} {direction} (at most {MAX_PORTS})"
                    )));
                }
            }
            scratch.insert_node(id, &node.class_name, node.name.clone())?;

            if let Some(count) = node.inputs {
                if scratch.node(id).map(|n| n.num_inputs()) != Some(count) {
                    scratch.set_num_inputs(id, count)?;
                }
            }
            if let Some(count) = node.outputs {
                if scratch.node(id).map(|n| n.num_outputs()) != Some(count) {
                    scratch.set_num_outputs(id, count)?;
                }
            }
            if let Some(node) = scratch.node(id) {
                names.entry(node.name().to_string()).or_default().push(id);
            }
        }

        let mut bound: HashSet<(NodeId, usize)> = HashSet::new();
        for link in &description.links {
            let source = resolve_node(&scratch, &names, &link.src)?;
            let target = resolve_node(&scratch, &names, &link.dst)?;
            let source_port = resolve_port(&scratch, source, PortDirection::Output, &link.srcp)?;
            let target_port = resolve_port(&scratch, target, PortDirection::Input, &link.dstp)?;

            if !bound.insert((target, target_port)) {
                return Err(malformed(format!(
                    "input {} of {} is linked more than once",
                    link.dstp, link.dst
                )));
            }
            scratch.link(source, source_port, target, target_port)?;
        }

        tracing::debug!(
            "Loaded graph {} with {} node(s) and {} link(s)",
            scratch.name,
            scratch.node_count(),
            scratch.link_count()
        );
        self.replace_content(scratch);
        Ok(())
    }
}

fn resolve_node(graph: &Graph, names: &HashMap<String, Vec<NodeId>>, reference: &str) -> Result<NodeId> {
    if let Ok(uuid) = Uuid::parse_str(reference) {
        let id = NodeId(uuid);
        if graph.contains_node(id) {
            return Ok(id);
        }
    }
    match names.get(reference).map(Vec::as_slice) {
        Some([id]) => Ok(*id),
        Some([_, _, ..]) => Err(malformed(format!("node name {reference:?} is ambiguous"))),
        _ => Err(malformed(format!("unknown node {reference:?}"))),
    }
}

fn resolve_port(
    graph: &Graph,
    node: NodeId,
    direction: PortDirection,
    reference: &PortRef,
) -> Result<usize> {
    let name = match reference {
        PortRef::Index(index) => return Ok(*index),
        PortRef::Name(name) => name,
    };
    let body = graph.node(node).ok_or(GraphError::NodeNotInGraph(node))?.body();
    let ports = match direction {
        PortDirection::Input => body.inputs(),
        PortDirection::Output => body.outputs(),
    };
    ports
        .iter()
        .position(|port| &port.name == name)
        .ok_or_else(|| malformed(format!("node {node} has no {direction:?} port named {name:?}")))
}
