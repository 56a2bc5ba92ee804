// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! The graph is the only owner of nodes and links. Links refer to nodes by
//! [`NodeId`], so removing a node drops its links in the same call and no link
//! can outlive an endpoint.

use crate::error::{GraphError, Result};
use crate::link::{Link, LinkId};
use crate::node::{NodeId, NodeRegistry, PipelineNode};
use crate::port::PortDirection;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Largest port count a variable-port node can be resized to
pub const MAX_PORTS: usize = 1024;

/// Identity of a graph instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A render pipeline graph
pub struct Graph {
    id: GraphId,
    /// Graph name
    pub name: String,
    registry: Arc<NodeRegistry>,
    /// Nodes in insertion order
    nodes: IndexMap<NodeId, PipelineNode>,
    /// Links between nodes
    links: IndexMap<LinkId, Link>,
    /// Bumped by every topology change
    revision: u64,
}

impl Graph {
    /// Create a new empty graph instantiating nodes from `registry`
    pub fn new(name: impl Into<String>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            id: GraphId::new(),
            name: name.into(),
            registry,
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            revision: 0,
        }
    }

    /// Identity of this graph instance
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Topology revision, changes whenever nodes, links or port counts change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Registry used to instantiate nodes
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Instantiate a registered node class and add it to the graph
    pub fn add_node(&mut self, class_name: &str) -> Result<NodeId> {
        self.insert_node(NodeId::new(), class_name, None)
    }

    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        class_name: &str,
        name: Option<String>,
    ) -> Result<NodeId> {
        let body = self
            .registry
            .create(class_name)
            .ok_or_else(|| GraphError::UnknownNodeType(class_name.to_string()))?;
        let name = name.unwrap_or_else(|| {
            self.registry
                .info(class_name)
                .map_or_else(|| class_name.to_string(), |info| info.display_name.clone())
        });

        tracing::debug!("Added node {name} ({class_name}) as {id}");
        self.nodes.insert(id, PipelineNode::new(id, name, body));
        self.touch();
        Ok(id)
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<PipelineNode> {
        let node = self
            .nodes
            .shift_remove(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let before = self.links.len();
        self.links.retain(|_, link| !link.involves_node(node_id));

        tracing::debug!(
            "Removed node {} with {} link(s)",
            node.name(),
            before - self.links.len()
        );
        self.touch();
        Ok(node)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&PipelineNode> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID.
    ///
    /// Port lists can only be resized through [`Graph::set_num_inputs`] and
    /// [`Graph::set_num_outputs`].
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut PipelineNode> {
        self.nodes.get_mut(&node_id)
    }

    /// Check if a node belongs to this graph
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get all nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &PipelineNode> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut PipelineNode> {
        self.nodes.values_mut()
    }

    /// Get all node IDs, in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rename a node
    pub fn set_node_name(&mut self, node_id: NodeId, name: impl Into<String>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.set_name(name.into());
        Ok(())
    }

    /// Link an output port to an input port.
    ///
    /// An input accepts one link: an existing link into `target_port` is
    /// replaced. Self-links are accepted here and reported as cycles by
    /// [`Graph::validate`] and the scheduler.
    pub fn link(
        &mut self,
        source: NodeId,
        source_port: usize,
        target: NodeId,
        target_port: usize,
    ) -> Result<LinkId> {
        let source_node = self
            .nodes
            .get(&source)
            .ok_or(GraphError::NodeNotInGraph(source))?;
        let target_node = self
            .nodes
            .get(&target)
            .ok_or(GraphError::NodeNotInGraph(target))?;

        check_port(source, PortDirection::Output, source_port, source_node.num_outputs())?;
        check_port(target, PortDirection::Input, target_port, target_node.num_inputs())?;

        let source_type = source_node.body().output_type(source_port);
        let target_type = target_node.body().input_type(target_port);
        if !self.registry.port_types().is_compatible(source_type, target_type) {
            return Err(GraphError::PortTypeMismatch {
                source_type: source_type.clone(),
                target_type: target_type.clone(),
            });
        }

        if let Some(replaced) = self.remove_input_link(target, target_port) {
            tracing::debug!(
                "Replacing link into {target}:{target_port} from {}:{}",
                replaced.source,
                replaced.source_port
            );
        }

        let link = Link::new(source, source_port, target, target_port);
        let id = link.id;
        self.links.insert(id, link);
        self.touch();
        Ok(id)
    }

    /// Remove the link feeding an input, if any
    pub fn unlink(&mut self, target: NodeId, target_port: usize) -> Option<Link> {
        let removed = self.remove_input_link(target, target_port);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    fn remove_input_link(&mut self, target: NodeId, target_port: usize) -> Option<Link> {
        let id = self.input_link(target, target_port)?.id;
        self.links.shift_remove(&id)
    }

    /// Get the link feeding an input
    pub fn input_link(&self, target: NodeId, target_port: usize) -> Option<&Link> {
        self.links
            .values()
            .find(|link| link.feeds(target, target_port))
    }

    /// Get a link by ID
    pub fn link_by_id(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get all links
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Get links leaving a node
    pub fn links_from_node(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |link| link.source == node_id)
    }

    /// Get links entering a node
    pub fn links_into(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |link| link.target == node_id)
    }

    /// Get links involving a node
    pub fn links_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |link| link.involves_node(node_id))
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Resize the input list of a variable-input node.
    ///
    /// Links into inputs that no longer exist are dropped. Returns the number
    /// of dropped links. Counts above [`MAX_PORTS`] are rejected.
    pub fn set_num_inputs(&mut self, node_id: NodeId, count: usize) -> Result<usize> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if !node.body().has_variable_inputs() {
            return Err(GraphError::PortCountFixed {
                node: node_id,
                direction: PortDirection::Input,
            });
        }
        if count > MAX_PORTS {
            return Err(GraphError::TooManyPorts {
                node: node_id,
                direction: PortDirection::Input,
                count,
            });
        }
        node.body_mut().set_num_inputs(count);
        let remaining = node.num_inputs();

        let before = self.links.len();
        self.links
            .retain(|_, link| link.target != node_id || link.target_port < remaining);
        self.touch();
        Ok(before - self.links.len())
    }

    /// Resize the output list of a variable-output node.
    ///
    /// Links from outputs that no longer exist are dropped. Returns the number
    /// of dropped links. Counts above [`MAX_PORTS`] are rejected.
    pub fn set_num_outputs(&mut self, node_id: NodeId, count: usize) -> Result<usize> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if !node.body().has_variable_outputs() {
            return Err(GraphError::PortCountFixed {
                node: node_id,
                direction: PortDirection::Output,
            });
        }
        if count > MAX_PORTS {
            return Err(GraphError::TooManyPorts {
                node: node_id,
                direction: PortDirection::Output,
                count,
            });
        }
        node.body_mut().set_num_outputs(count);
        let remaining = node.num_outputs();

        let before = self.links.len();
        self.links
            .retain(|_, link| link.source != node_id || link.source_port < remaining);
        self.touch();
        Ok(before - self.links.len())
    }

    /// Get nodes in dependency order.
    ///
    /// Kahn's algorithm; among nodes that are ready at the same time the one
    /// inserted first goes first, so equal topologies always give equal orders.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        let count = ids.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

        for link in self.links.values() {
            let (Some(source), Some(target)) = (
                self.nodes.get_index_of(&link.source),
                self.nodes.get_index_of(&link.target),
            ) else {
                continue;
            };
            dependents[source].push(target);
            in_degree[target] += 1;
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != count {
            let nodes = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| ids[i])
                .collect();
            return Err(GraphError::CyclicGraph { nodes });
        }
        Ok(order.into_iter().map(|i| ids[i]).collect())
    }

    /// Required inputs that have no incoming link, in node order
    pub fn unbound_required_inputs(&self) -> Vec<GraphError> {
        let mut issues = Vec::new();
        for node in self.nodes.values() {
            for port in 0..node.num_inputs() {
                if node.body().is_input_required(port) && self.input_link(node.id(), port).is_none() {
                    issues.push(GraphError::RequiredInputUnbound {
                        node: node.id(),
                        port,
                    });
                }
            }
        }
        issues
    }

    /// Check the whole graph and report every problem found
    pub fn validate(&self) -> ValidationReport {
        let mut issues = Vec::new();

        for link in self.links.values() {
            let Some(source) = self.nodes.get(&link.source) else {
                issues.push(GraphError::NodeNotInGraph(link.source));
                continue;
            };
            let Some(target) = self.nodes.get(&link.target) else {
                issues.push(GraphError::NodeNotInGraph(link.target));
                continue;
            };

            let source_ok = check_port(
                link.source,
                PortDirection::Output,
                link.source_port,
                source.num_outputs(),
            )
            .map_err(|e| issues.push(e))
            .is_ok();
            let target_ok = check_port(
                link.target,
                PortDirection::Input,
                link.target_port,
                target.num_inputs(),
            )
            .map_err(|e| issues.push(e))
            .is_ok();

            if source_ok && target_ok {
                let source_type = source.body().output_type(link.source_port);
                let target_type = target.body().input_type(link.target_port);
                if !self.registry.port_types().is_compatible(source_type, target_type) {
                    issues.push(GraphError::PortTypeMismatch {
                        source_type: source_type.clone(),
                        target_type: target_type.clone(),
                    });
                }
            }
        }

        issues.extend(self.unbound_required_inputs());

        if let Err(cycle) = self.topological_order() {
            issues.push(cycle);
        }

        ValidationReport { issues }
    }

    /// Replace the content of this graph with `other`, keeping this graph's identity
    pub(crate) fn replace_content(&mut self, other: Graph) {
        self.name = other.name;
        self.registry = other.registry;
        self.nodes = other.nodes;
        self.links = other.links;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.values().collect::<Vec<_>>())
            .field("links", &self.links.values().collect::<Vec<_>>())
            .field("revision", &self.revision)
            .finish()
    }
}

fn check_port(node: NodeId, direction: PortDirection, index: usize, count: usize) -> Result<()> {
    if index < count {
        Ok(())
    } else {
        Err(GraphError::PortIndexOutOfRange {
            node,
            direction,
            index,
            count,
        })
    }
}

/// Every problem found by [`Graph::validate`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    issues: Vec<GraphError>,
}

impl ValidationReport {
    /// True when no problem was found
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    /// Problems found
    pub fn issues(&self) -> &[GraphError] {
        &self.issues
    }

    /// Number of problems
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// True when no problem was found
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Convert into a result carrying every problem
    pub fn into_result(self) -> std::result::Result<(), Vec<GraphError>> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self.issues)
        }
    }
}
