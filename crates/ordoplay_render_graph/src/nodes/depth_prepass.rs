// SPDX-License-Identifier: MIT OR Apache-2.0
//! Depth-only pass over the scene.

use crate::context::{RenderContext, SetupContext};
use crate::error::NodeError;
use crate::node::RenderNode;
use crate::port::{PortInfo, PortType, PortValue};
use crate::scheduler::NodeIo;

/// Fills a depth buffer and hands it on
pub struct DepthPrepass {
    inputs: [PortInfo; 1],
    outputs: [PortInfo; 1],
}

impl Default for DepthPrepass {
    fn default() -> Self {
        Self {
            inputs: [PortInfo::input("Depth", PortType::DepthStencil).required()],
            outputs: [PortInfo::output("Depth", PortType::DepthStencil)],
        }
    }
}

impl RenderNode for DepthPrepass {
    fn class_name(&self) -> &str {
        "DepthPrepass"
    }

    fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, _ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        let depth = io.input_texture(0)?;
        io.set_output(0, PortValue::Texture(depth));
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        let depth = io.input_texture(0)?;
        ctx.record(io.node(), format!("depth prepass into {}", depth.id));
        Ok(())
    }
}
