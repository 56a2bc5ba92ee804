// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layer compositing.

use crate::context::{RenderContext, SetupContext, TextureDesc, TextureFormat, TextureHandle, TextureUsage};
use crate::error::NodeError;
use crate::node::RenderNode;
use crate::port::{PortInfo, PortType, PortValue};
use crate::scheduler::NodeIo;

const DEFAULT_LAYERS: usize = 2;

/// Composites a variable number of layers, first layer at the bottom
pub struct Blend {
    inputs: Vec<PortInfo>,
    outputs: [PortInfo; 1],
    result: Option<TextureHandle>,
}

impl Blend {
    fn layer(index: usize) -> PortInfo {
        PortInfo::input(format!("Layer {index}"), PortType::Texture).required()
    }
}

impl Default for Blend {
    fn default() -> Self {
        Self {
            inputs: (0..DEFAULT_LAYERS).map(Self::layer).collect(),
            outputs: [PortInfo::output("Result", PortType::RenderTarget)],
            result: None,
        }
    }
}

impl RenderNode for Blend {
    fn class_name(&self) -> &str {
        "Blend"
    }

    fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    fn has_variable_inputs(&self) -> bool {
        true
    }

    fn set_num_inputs(&mut self, count: usize) {
        let current = self.inputs.len();
        if count < current {
            self.inputs.truncate(count);
        } else {
            self.inputs.extend((current..count).map(Self::layer));
        }
    }

    fn reset(&mut self) {
        self.result = None;
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        let (width, height) = match io.input(0).as_ref().and_then(PortValue::as_texture) {
            Some(base) => base.desc.size(),
            None => ctx.render_size(),
        };
        let result = ctx.create_texture(TextureDesc::new(
            width,
            height,
            TextureFormat::Rgba16F,
            TextureUsage::RenderTarget,
        ))?;
        self.result = Some(result);
        io.set_output(0, PortValue::Texture(result));
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        let result = self.result.ok_or_else(|| NodeError::Custom("result was not set up".into()))?;
        let layers = (0..self.inputs.len())
            .map(|index| io.input_texture(index).map(|layer| layer.id.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        ctx.record(
            io.node(),
            format!("blend [{}] into {}", layers.join(", "), result.id),
        );
        Ok(())
    }
}
