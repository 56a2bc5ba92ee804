// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in pipeline nodes.
//!
//! These nodes only exercise the node contract: their work is recording
//! commands on the [`RenderContext`](crate::RenderContext).

mod blend;
mod create_texture;
mod depth_prepass;
mod forward_render;
mod render_to_backbuffer;

pub use blend::Blend;
pub use create_texture::CreateTexture;
pub use depth_prepass::DepthPrepass;
pub use forward_render::ForwardRender;
pub use render_to_backbuffer::RenderToBackbuffer;

use crate::node::NodeRegistry;

/// Group the built-in nodes are registered under
pub const GROUP: &str = "Pipeline";

/// Register the built-in node classes
pub fn register_builtin_nodes(registry: &mut NodeRegistry) {
    registry.register_with(GROUP, "Color render target sized to the frame", CreateTexture::color);
    registry.register_with(GROUP, "Depth buffer sized to the frame", CreateTexture::depth);
    registry.register::<DepthPrepass>(GROUP, "Depth-only pass over the scene");
    registry.register::<ForwardRender>(GROUP, "Forward shading pass");
    registry.register::<Blend>(GROUP, "Composite layers over each other");
    registry.register::<RenderToBackbuffer>(GROUP, "Present the final image");
}

/// Create a registry holding the built-in node classes
pub fn create_builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_builtin_nodes(&mut registry);
    registry
}
