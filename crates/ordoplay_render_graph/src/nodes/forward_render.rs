// SPDX-License-Identifier: MIT OR Apache-2.0
//! Forward shading pass.

use crate::context::{RenderContext, SetupContext, TextureHandle};
use crate::error::NodeError;
use crate::node::RenderNode;
use crate::port::{PortInfo, PortType, PortValue};
use crate::scheduler::NodeIo;

/// Shades the scene into a color target, testing against a prepared depth buffer
pub struct ForwardRender {
    inputs: [PortInfo; 2],
    outputs: [PortInfo; 1],
}

impl Default for ForwardRender {
    fn default() -> Self {
        Self {
            inputs: [
                PortInfo::input("Color", PortType::RenderTarget).required(),
                PortInfo::input("Depth", PortType::DepthStencil).required(),
            ],
            outputs: [PortInfo::output("Color", PortType::RenderTarget)],
        }
    }
}

impl ForwardRender {
    fn targets(io: &NodeIo<'_>) -> Result<(TextureHandle, TextureHandle), NodeError> {
        let color = io.input_texture(0)?;
        let depth = io.input_texture(1)?;
        if color.desc.size() != depth.desc.size() {
            return Err(NodeError::Custom(format!(
                "color target is {:?} but depth buffer is {:?}",
                color.desc.size(),
                depth.desc.size()
            )));
        }
        Ok((color, depth))
    }
}

impl RenderNode for ForwardRender {
    fn class_name(&self) -> &str {
        "ForwardRender"
    }

    fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, _ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        let (color, _) = Self::targets(io)?;
        io.set_output(0, PortValue::Texture(color));
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        let (color, depth) = Self::targets(io)?;
        ctx.record(io.node(), format!("forward render into {} with depth {}", color.id, depth.id));
        Ok(())
    }
}
