// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transient texture source.

use crate::context::{RenderContext, SetupContext, TextureDesc, TextureFormat, TextureHandle, TextureUsage};
use crate::error::NodeError;
use crate::node::RenderNode;
use crate::port::{PortInfo, PortType, PortValue};
use crate::scheduler::NodeIo;

/// Allocates a texture sized to the frame's render size
pub struct CreateTexture {
    class: &'static str,
    format: TextureFormat,
    usage: TextureUsage,
    outputs: Vec<PortInfo>,
    texture: Option<TextureHandle>,
}

impl CreateTexture {
    /// Color render target (`CreateTexture`)
    pub fn color() -> Self {
        Self::new("CreateTexture", TextureFormat::Rgba16F, TextureUsage::RenderTarget, PortType::RenderTarget)
    }

    /// Depth buffer (`CreateDepthBuffer`)
    pub fn depth() -> Self {
        Self::new("CreateDepthBuffer", TextureFormat::Depth32F, TextureUsage::DepthStencil, PortType::DepthStencil)
    }

    fn new(class: &'static str, format: TextureFormat, usage: TextureUsage, port_type: PortType) -> Self {
        Self {
            class,
            format,
            usage,
            outputs: vec![PortInfo::output("Texture", port_type)],
            texture: None,
        }
    }

    /// Texture allocated for the current frame
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }
}

impl Default for CreateTexture {
    fn default() -> Self {
        Self::color()
    }
}

impl RenderNode for CreateTexture {
    fn class_name(&self) -> &str {
        self.class
    }

    fn inputs(&self) -> &[PortInfo] {
        &[]
    }

    fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    fn reset(&mut self) {
        self.texture = None;
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        let (width, height) = ctx.render_size();
        let texture = ctx.create_texture(TextureDesc::new(width, height, self.format, self.usage))?;
        self.texture = Some(texture);
        io.set_output(0, PortValue::Texture(texture));
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        let texture = self.texture.ok_or_else(|| NodeError::Custom("texture was not set up".into()))?;
        ctx.record(io.node(), format!("clear texture {}", texture.id));
        Ok(())
    }
}
