// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configurable node used by the unit tests.

use crate::context::{RenderContext, SetupContext, TextureDesc, TextureFormat, TextureUsage};
use crate::error::NodeError;
use crate::node::{FrameListener, NodeRegistry, RenderNode};
use crate::port::{PortInfo, PortType, PortValue};
use crate::scheduler::{FramePhase, NodeIo};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared record of node calls, entries look like `B:Setup` or `A:begin 3`
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Node whose ports and behaviour are set up by the test
pub struct ProbeNode {
    class: String,
    inputs: Vec<PortInfo>,
    outputs: Vec<PortInfo>,
    variable_inputs: bool,
    fail_in: Option<FramePhase>,
    listens: bool,
    log: Option<CallLog>,
}

impl ProbeNode {
    fn new(class: &str, inputs: Vec<PortInfo>, outputs: Vec<PortInfo>) -> Self {
        Self {
            class: class.to_string(),
            inputs,
            outputs,
            variable_inputs: false,
            fail_in: None,
            listens: false,
            log: None,
        }
    }

    fn input_ports(count: usize) -> Vec<PortInfo> {
        (0..count)
            .map(|i| PortInfo::input(format!("In {i}"), PortType::Texture).required())
            .collect()
    }

    /// No inputs, one texture output
    pub fn source(class: &str) -> Self {
        Self::new(class, Vec::new(), vec![PortInfo::output("Out", PortType::Texture)])
    }

    /// `count` required texture inputs, no outputs
    pub fn with_inputs(class: &str, count: usize) -> Self {
        Self::new(class, Self::input_ports(count), Vec::new())
    }

    /// One required texture input, one texture output
    pub fn filter(class: &str) -> Self {
        Self::new(
            class,
            Self::input_ports(1),
            vec![PortInfo::output("Out", PortType::Texture)],
        )
    }

    /// One optional texture input, no outputs
    pub fn optional(class: &str) -> Self {
        Self::new(
            class,
            vec![PortInfo::input("In 0", PortType::Texture)],
            Vec::new(),
        )
    }

    /// No inputs, one boolean output
    pub fn flag(class: &str) -> Self {
        Self::new(class, Vec::new(), vec![PortInfo::output("Flag", PortType::Bool)])
    }

    /// Variable count of required texture inputs
    pub fn variadic(class: &str, count: usize) -> Self {
        let mut node = Self::with_inputs(class, count);
        node.variable_inputs = true;
        node
    }

    /// Fail in the given phase
    pub fn failing(mut self, phase: FramePhase) -> Self {
        self.fail_in = Some(phase);
        self
    }

    /// Opt into frame notifications
    pub fn listening(mut self) -> Self {
        self.listens = true;
        self
    }

    /// Record calls into `log`
    pub fn logged(mut self, log: &CallLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    fn record(&self, entry: String) {
        if let Some(log) = &self.log {
            log.lock().push(entry);
        }
    }

    fn enter(&self, phase: FramePhase) -> Result<(), NodeError> {
        self.record(format!("{}:{phase}", self.class));
        if self.fail_in == Some(phase) {
            return Err(NodeError::Custom(format!("{} failed on purpose", self.class)));
        }
        Ok(())
    }

    fn read_inputs(&self, io: &NodeIo<'_>) -> Result<(), NodeError> {
        for index in 0..io.num_inputs() {
            if io.is_linked(index) {
                io.require_input(index)?;
            }
        }
        Ok(())
    }
}

impl RenderNode for ProbeNode {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    fn has_variable_inputs(&self) -> bool {
        self.variable_inputs
    }

    fn set_num_inputs(&mut self, count: usize) {
        if self.variable_inputs {
            self.inputs = Self::input_ports(count);
        }
    }

    fn reset(&mut self) {
        self.record(format!("{}:{}", self.class, FramePhase::Reset));
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        self.enter(FramePhase::Setup)?;
        self.read_inputs(io)?;
        let (width, height) = ctx.render_size();
        for (index, port) in self.outputs.iter().enumerate() {
            let value = match port.port_type {
                PortType::Bool => PortValue::Bool(true),
                _ => PortValue::Texture(ctx.create_texture(TextureDesc::new(
                    width,
                    height,
                    TextureFormat::Rgba8,
                    TextureUsage::ShaderResource,
                ))?),
            };
            io.set_output(index, value);
        }
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        self.enter(FramePhase::Execute)?;
        self.read_inputs(io)?;
        ctx.record(io.node(), self.class.clone());
        Ok(())
    }

    fn frame_listener(&mut self) -> Option<&mut dyn FrameListener> {
        if self.listens {
            Some(self)
        } else {
            None
        }
    }
}

impl FrameListener for ProbeNode {
    fn on_frame_begin(&mut self, frame: u64) {
        self.record(format!("{}:begin {frame}", self.class));
    }

    fn on_frame_end(&mut self, frame: u64) {
        self.record(format!("{}:end {frame}", self.class));
    }
}

/// Registry with the probe classes used across the tests:
/// `A` source, `B` filter, `C` two-input sink, `Flag` bool source,
/// `Variadic` sink, `Optional` sink, `Failing` filter failing in Execute,
/// `Listener` source with frame notifications.
pub fn probe_registry(log: &CallLog) -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    let probes: [(&str, fn() -> ProbeNode); 8] = [
        ("A", || ProbeNode::source("A")),
        ("B", || ProbeNode::filter("B")),
        ("C", || ProbeNode::with_inputs("C", 2)),
        ("Flag", || ProbeNode::flag("Flag")),
        ("Variadic", || ProbeNode::variadic("Variadic", 2)),
        ("Optional", || ProbeNode::optional("Optional")),
        ("Failing", || ProbeNode::filter("Failing").failing(FramePhase::Execute)),
        ("Listener", || ProbeNode::source("Listener").listening()),
    ];
    for (class, make) in probes {
        let log = Arc::clone(log);
        let registered = registry.register_with("Test", class, move || make().logged(&log));
        assert!(registered, "probe class {class} registered twice");
    }
    Arc::new(registry)
}
