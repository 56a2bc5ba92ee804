// SPDX-License-Identifier: MIT OR Apache-2.0
//! Presentation of the final image.

use crate::context::{RenderContext, SetupContext};
use crate::error::NodeError;
use crate::node::{FrameListener, RenderNode};
use crate::port::{PortInfo, PortType};
use crate::scheduler::NodeIo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Copies its input to the backbuffer and counts presented frames
pub struct RenderToBackbuffer {
    inputs: [PortInfo; 1],
    presented: Arc<AtomicU64>,
    frame: Option<u64>,
    copied: bool,
}

impl RenderToBackbuffer {
    /// Count presented frames into a shared counter
    pub fn with_counter(presented: Arc<AtomicU64>) -> Self {
        Self {
            inputs: [PortInfo::input("Image", PortType::Texture).required()],
            presented,
            frame: None,
            copied: false,
        }
    }

    /// Frames presented so far
    pub fn presented_frames(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

impl Default for RenderToBackbuffer {
    fn default() -> Self {
        Self::with_counter(Arc::default())
    }
}

impl RenderNode for RenderToBackbuffer {
    fn class_name(&self) -> &str {
        "RenderToBackbuffer"
    }

    fn inputs(&self) -> &[PortInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[PortInfo] {
        &[]
    }

    fn reset(&mut self) {
        self.copied = false;
    }

    fn setup(&mut self, io: &mut NodeIo<'_>, _ctx: &SetupContext<'_>) -> Result<(), NodeError> {
        io.input_texture(0)?;
        Ok(())
    }

    fn execute(&mut self, io: &mut NodeIo<'_>, ctx: &RenderContext) -> Result<(), NodeError> {
        let image = io.input_texture(0)?;
        ctx.record(io.node(), format!("present {}", image.id));
        self.copied = true;
        Ok(())
    }

    fn frame_listener(&mut self) -> Option<&mut dyn FrameListener> {
        Some(self)
    }
}

impl FrameListener for RenderToBackbuffer {
    fn on_frame_begin(&mut self, frame: u64) {
        self.frame = Some(frame);
    }

    fn on_frame_end(&mut self, frame: u64) {
        if self.copied && self.frame == Some(frame) {
            let total = self.presented.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!("Presented frame {frame} ({total} total)");
        }
        self.frame = None;
    }
}
