// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the render pipeline.
//!
//! Concrete passes implement [`RenderNode`]. The graph stores each instance in
//! a [`PipelineNode`], which adds the graph-level identity and display name.
//! Classes are instantiated by name through the [`NodeRegistry`].

use crate::context::{RenderContext, SetupContext};
use crate::error::NodeError;
use crate::port::{PortInfo, PortType, PortTypeRegistry};
use crate::scheduler::NodeIo;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
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
        self.0.fmt(f)
    }
}

/// Optional capability: notifications around each frame.
///
/// Nodes opt in by returning themselves from [`RenderNode::frame_listener`].
pub trait FrameListener {
    /// Called before the Reset pass of a frame
    fn on_frame_begin(&mut self, frame: u64);
    /// Called after the Execute pass of a frame completed
    fn on_frame_end(&mut self, frame: u64);
}

/// A render pipeline pass.
///
/// Every frame the scheduler calls [`reset`](RenderNode::reset),
/// [`setup`](RenderNode::setup) and [`execute`](RenderNode::execute) exactly
/// once each, in that order, following the topological order of the graph.
///
/// Port accessors index into [`inputs`](RenderNode::inputs) and
/// [`outputs`](RenderNode::outputs) and panic when the index is out of range.
/// Validated paths ([`Graph::link`](crate::Graph::link) and friends) check
/// indices before calling them.
pub trait RenderNode: Send {
    /// Name of the node class, used by the registry and the pipeline description
    fn class_name(&self) -> &str;

    /// Input port descriptors
    fn inputs(&self) -> &[PortInfo];

    /// Output port descriptors
    fn outputs(&self) -> &[PortInfo];

    /// Whether the input count can be changed
    fn has_variable_inputs(&self) -> bool {
        false
    }

    /// Whether the output count can be changed
    fn has_variable_outputs(&self) -> bool {
        false
    }

    /// Resize the input list. Ignored by nodes with fixed inputs.
    fn set_num_inputs(&mut self, _count: usize) {}

    /// Resize the output list. Ignored by nodes with fixed outputs.
    fn set_num_outputs(&mut self, _count: usize) {}

    /// Clear per-frame state. May be called any number of times.
    fn reset(&mut self) {}

    /// Allocate resources and publish output descriptors
    fn setup(&mut self, io: &mut NodeIo<'_>, ctx: &SetupContext<'_>) -> Result<(), NodeError>;

    /// Do the frame's work, reading inputs produced upstream
    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError>;

    /// Frame notification capability, if this node has it
    fn frame_listener(&mut self) -> Option<&mut dyn FrameListener> {
        None
    }

    /// Number of input ports
    fn num_inputs(&self) -> usize {
        self.inputs().len()
    }

    /// Number of output ports
    fn num_outputs(&self) -> usize {
        self.outputs().len()
    }

    /// Descriptor of an input port
    fn input_port(&self, index: usize) -> &PortInfo {
        let inputs = self.inputs();
        assert!(
            index < inputs.len(),
            "input {index} out of range for {} ({} inputs)",
            self.class_name(),
            inputs.len()
        );
        &inputs[index]
    }

    /// Descriptor of an output port
    fn output_port(&self, index: usize) -> &PortInfo {
        let outputs = self.outputs();
        assert!(
            index < outputs.len(),
            "output {index} out of range for {} ({} outputs)",
            self.class_name(),
            outputs.len()
        );
        &outputs[index]
    }

    /// Name of an input port
    fn input_name(&self, index: usize) -> &str {
        &self.input_port(index).name
    }

    /// Name of an output port
    fn output_name(&self, index: usize) -> &str {
        &self.output_port(index).name
    }

    /// Type of an input port
    fn input_type(&self, index: usize) -> &PortType {
        &self.input_port(index).port_type
    }

    /// Type of an output port
    fn output_type(&self, index: usize) -> &PortType {
        &self.output_port(index).port_type
    }

    /// Whether an input must be linked
    fn is_input_required(&self, index: usize) -> bool {
        self.input_port(index).required
    }
}

/// A node instance owned by a graph
pub struct PipelineNode {
    id: NodeId,
    name: String,
    body: Box<dyn RenderNode>,
}

impl PipelineNode {
    pub(crate) fn new(id: NodeId, name: String, body: Box<dyn RenderNode>) -> Self {
        Self { id, name, body }
    }

    /// Unique instance ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Class name of the node body
    pub fn class_name(&self) -> &str {
        self.body.class_name()
    }

    /// Number of input ports
    pub fn num_inputs(&self) -> usize {
        self.body.num_inputs()
    }

    /// Number of output ports
    pub fn num_outputs(&self) -> usize {
        self.body.num_outputs()
    }

    /// The node implementation
    pub fn body(&self) -> &dyn RenderNode {
        self.body.as_ref()
    }

    /// The node implementation, mutably.
    ///
    /// Port counts are owned by the graph, so outside the crate node bodies
    /// are only reachable through [`Graph::set_num_inputs`](crate::Graph::set_num_inputs)
    /// and friends:
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    /// use ordoplay_render_graph::{nodes, Graph};
    ///
    /// let mut graph = Graph::new("Blend", Arc::new(nodes::create_builtin_registry()));
    /// let blend = graph.add_node("Blend").unwrap();
    /// graph.node_mut(blend).unwrap().body_mut().set_num_inputs(1);
    /// ```
    pub(crate) fn body_mut(&mut self) -> &mut dyn RenderNode {
        self.body.as_mut()
    }
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("class", &self.class_name())
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .finish()
    }
}

/// Description of a registered node class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Class name
    pub class_name: String,
    /// Display name
    pub display_name: String,
    /// Group path, e.g. `Pipeline/Post`
    pub group: String,
    /// Description
    pub description: String,
    /// Default input ports
    pub inputs: Vec<PortInfo>,
    /// Default output ports
    pub outputs: Vec<PortInfo>,
    /// Whether the input count can change
    pub variable_inputs: bool,
    /// Whether the output count can change
    pub variable_outputs: bool,
}

type NodeFactory = Box<dyn Fn() -> Box<dyn RenderNode> + Send + Sync>;

struct NodeCreator {
    info: NodeInfo,
    factory: NodeFactory,
}

/// Registry of available node classes
pub struct NodeRegistry {
    classes: IndexMap<String, NodeCreator>,
    port_types: PortTypeRegistry,
}

impl NodeRegistry {
    /// Create an empty registry with the default port conversions
    pub fn new() -> Self {
        Self::with_port_types(PortTypeRegistry::with_defaults())
    }

    /// Create an empty registry with the given port type rules
    pub fn with_port_types(port_types: PortTypeRegistry) -> Self {
        Self {
            classes: IndexMap::new(),
            port_types,
        }
    }

    /// Register a node class constructed through [`Default`]
    pub fn register<N>(&mut self, group: &str, description: &str) -> bool
    where
        N: RenderNode + Default + 'static,
    {
        self.register_with(group, description, N::default)
    }

    /// Register a node class with a custom factory.
    ///
    /// The class name is taken from a probe instance. Returns false when the
    /// name contains `/` or is already registered.
    pub fn register_with<N, F>(&mut self, group: &str, description: &str, factory: F) -> bool
    where
        N: RenderNode + 'static,
        F: Fn() -> N + Send + Sync + 'static,
    {
        let probe = factory();
        let class_name = probe.class_name().to_string();
        if class_name.is_empty() || class_name.contains('/') {
            tracing::warn!("Rejected node class with invalid name: {class_name:?}");
            return false;
        }
        if self.classes.contains_key(&class_name) {
            tracing::warn!("Node class already registered: {class_name}");
            return false;
        }

        let info = NodeInfo {
            display_name: display_name_for(&class_name),
            class_name: class_name.clone(),
            group: group.trim_end_matches('/').to_string(),
            description: description.to_string(),
            inputs: probe.inputs().to_vec(),
            outputs: probe.outputs().to_vec(),
            variable_inputs: probe.has_variable_inputs(),
            variable_outputs: probe.has_variable_outputs(),
        };
        let factory: NodeFactory = Box::new(move || -> Box<dyn RenderNode> { Box::new(factory()) });
        self.classes.insert(class_name, NodeCreator { info, factory });
        true
    }

    /// Instantiate a node class by name
    pub fn create(&self, class_name: &str) -> Option<Box<dyn RenderNode>> {
        self.classes.get(class_name).map(|creator| (creator.factory)())
    }

    /// Get information about a class
    pub fn info(&self, class_name: &str) -> Option<&NodeInfo> {
        self.classes.get(class_name).map(|creator| &creator.info)
    }

    /// Check if a class is registered
    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    /// All registered classes, in registration order
    pub fn classes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.classes.values().map(|creator| &creator.info)
    }

    /// Classes in a group
    pub fn in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a NodeInfo> + 'a {
        self.classes().filter(move |info| info.group == group)
    }

    /// Port type compatibility rules
    pub fn port_types(&self) -> &PortTypeRegistry {
        &self.port_types
    }

    /// Port type compatibility rules, mutably
    pub fn port_types_mut(&mut self) -> &mut PortTypeRegistry {
        &mut self.port_types
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("port_types", &self.port_types)
            .finish()
    }
}

/// Split a `CamelCase` class name into words: `ForwardRender` -> `Forward Render`
fn display_name_for(class_name: &str) -> String {
    let mut display = String::with_capacity(class_name.len() + 4);
    let mut previous: Option<char> = None;
    for c in class_name.chars() {
        let word_start = matches!(previous, Some(p) if p.is_lowercase() || p.is_ascii_digit());
        if c.is_uppercase() && word_start {
            display.push(' ');
        }
        display.push(c);
        previous = Some(c);
    }
    display
}
