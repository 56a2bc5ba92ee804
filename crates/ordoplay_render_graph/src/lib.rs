// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render pipeline graph for `OrdoPlay`.
//!
//! A pipeline is a directed acyclic graph of render pass nodes. Each node
//! exposes typed input and output ports; links carry per-frame values (texture
//! handles, descriptors, scalars) from producers to consumers.
//!
//! ## Architecture
//!
//! - [`Graph`] owns the nodes and links and arbitrates every structural change
//! - [`NodeRegistry`] maps class names to node factories
//! - [`PortTypeRegistry`] decides which port types may be linked
//! - [`Scheduler`] orders the graph and drives Reset, Setup and Execute each frame
//! - [`codec`] reads and writes the JSON pipeline description
//!
//! ```no_run
//! use std::sync::Arc;
//! use ordoplay_render_graph::{nodes, EngineConfig, EngineContext, Graph, NodeRegistry};
//! use ordoplay_render_graph::{ExecutionMode, RenderContext, Scheduler, SetupContext};
//!
//! let mut registry = NodeRegistry::new();
//! nodes::register_builtin_nodes(&mut registry);
//!
//! let mut graph = Graph::new("Forward", Arc::new(registry));
//! let color = graph.add_node("CreateTexture")?;
//! let present = graph.add_node("RenderToBackbuffer")?;
//! graph.link(color, 0, present, 0)?;
//!
//! let engine = EngineContext::initialize(&EngineConfig::default())?;
//! let mut scheduler = Scheduler::new(ExecutionMode::Sequential);
//! let setup = SetupContext::new(&engine, 0, (1280, 720));
//! let render = RenderContext::new(0);
//! scheduler.run_frame(&mut graph, &setup, &render)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod context;
pub mod error;
pub mod graph;
pub mod link;
pub mod node;
pub mod nodes;
pub mod port;
pub mod scheduler;
pub mod sync;

#[cfg(test)]
mod testing;

pub use codec::{GraphDescription, LinkDescription, NodeDescription, PortRef};
pub use context::{
    EngineConfig, EngineContext, RenderCommand, RenderContext, SetupContext, TextureDesc,
    TextureFormat, TextureHandle, TextureUsage,
};
pub use error::{EngineError, FrameError, GraphError, NodeError};
pub use graph::{Graph, GraphId, ValidationReport, MAX_PORTS};
pub use link::{Link, LinkId};
pub use node::{FrameListener, NodeId, NodeInfo, NodeRegistry, PipelineNode, RenderNode};
pub use port::{PortDirection, PortInfo, PortType, PortTypeRegistry, PortValue};
pub use scheduler::{compute_order, ExecutionMode, FramePhase, FrameReport, NodeIo, Schedule, Scheduler};
pub use sync::SpinLock;
