// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine context and the per-frame contexts handed to nodes.
//!
//! The [`EngineContext`] is created once by the frame driver and owns the
//! worker pool and the transient resource pool. Each frame the driver builds
//! exactly one [`SetupContext`] and one [`RenderContext`]; the scheduler passes
//! the same pair to every node of that frame.

use crate::error::EngineError;
use crate::node::NodeId;
use crate::sync::SpinLock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Pixel format of a transient texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float depth
    Depth32F,
}

/// How a texture is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureUsage {
    /// Sampled in shaders
    ShaderResource,
    /// Written as a color attachment
    RenderTarget,
    /// Written as a depth/stencil attachment
    DepthStencil,
}

/// Description of a texture to allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: TextureFormat,
    /// Binding usage
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Create a texture description
    pub fn new(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
        }
    }

    /// Size as `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Handle to a texture allocated from the transient pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// Allocation id, unique for the lifetime of the engine context
    pub id: u64,
    /// Description the texture was allocated with
    pub desc: TextureDesc,
}

/// Transient textures for the frame in flight.
///
/// Textures are handed out during Setup and returned to the free list when the
/// next frame resets. A request matching a free description reuses its backing
/// memory.
#[derive(Debug, Default)]
struct ResourcePool {
    next_id: u64,
    live: Vec<TextureHandle>,
    free: Vec<TextureDesc>,
    reused: u64,
}

impl ResourcePool {
    fn allocate(&mut self, desc: TextureDesc) -> TextureHandle {
        if let Some(slot) = self.free.iter().position(|free| *free == desc) {
            self.free.swap_remove(slot);
            self.reused += 1;
        }
        let handle = TextureHandle {
            id: self.next_id,
            desc,
        };
        self.next_id += 1;
        self.live.push(handle);
        handle
    }

    fn release_all(&mut self) -> usize {
        let count = self.live.len();
        self.free.extend(self.live.drain(..).map(|handle| handle.desc));
        count
    }

    fn clear(&mut self) {
        self.live.clear();
        self.free.clear();
    }
}

/// Engine start-up options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker threads for parallel frames. `None` uses the rayon default.
    pub worker_threads: Option<usize>,
}

/// Long-lived engine state shared by every frame
pub struct EngineContext {
    pool: Option<rayon::ThreadPool>,
    resources: SpinLock<ResourcePool>,
}

impl EngineContext {
    /// Start the engine: builds the worker pool and an empty resource pool
    pub fn initialize(config: &EngineConfig) -> Result<Self, EngineError> {
        if config.worker_threads == Some(0) {
            return Err(EngineError::WorkerPool(
                "worker_threads must be >= 1 when set".to_string(),
            ));
        }

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("ordoplay-render-{index}"));
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?;

        tracing::debug!("Engine context initialized with {} worker(s)", pool.current_num_threads());
        Ok(Self {
            pool: Some(pool),
            resources: SpinLock::new(ResourcePool::default()),
        })
    }

    /// Stop the engine. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.pool.take().is_some() {
            self.resources.lock().clear();
            tracing::debug!("Engine context shut down");
        }
    }

    /// Whether [`EngineContext::shutdown`] has not run yet
    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Number of worker threads, zero after shutdown
    pub fn worker_count(&self) -> usize {
        self.pool.as_ref().map_or(0, rayon::ThreadPool::current_num_threads)
    }

    /// Number of textures allocated in the current frame
    pub fn live_textures(&self) -> usize {
        self.resources.lock().live.len()
    }

    /// Number of allocations served from the free list so far
    pub fn reused_textures(&self) -> u64 {
        self.resources.lock().reused
    }

    pub(crate) fn worker_pool(&self) -> Result<&rayon::ThreadPool, EngineError> {
        self.pool.as_ref().ok_or(EngineError::ShutDown)
    }

    pub(crate) fn allocate_texture(&self, desc: TextureDesc) -> Result<TextureHandle, EngineError> {
        if !self.is_running() {
            return Err(EngineError::ShutDown);
        }
        Ok(self.resources.lock().allocate(desc))
    }

    pub(crate) fn release_transients(&self) -> usize {
        self.resources.lock().release_all()
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("workers", &self.worker_count())
            .field("live_textures", &self.live_textures())
            .finish()
    }
}

/// Capabilities available to nodes during Setup
#[derive(Debug)]
pub struct SetupContext<'a> {
    engine: &'a EngineContext,
    frame: u64,
    render_size: (u32, u32),
}

impl<'a> SetupContext<'a> {
    /// Create the setup context for one frame
    pub fn new(engine: &'a EngineContext, frame: u64, render_size: (u32, u32)) -> Self {
        Self {
            engine,
            frame,
            render_size,
        }
    }

    /// Frame index
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Size of the final image
    pub fn render_size(&self) -> (u32, u32) {
        self.render_size
    }

    /// Engine this frame runs on
    pub fn engine(&self) -> &'a EngineContext {
        self.engine
    }

    /// Allocate a texture that lives until the next frame resets
    pub fn create_texture(&self, desc: TextureDesc) -> Result<TextureHandle, EngineError> {
        self.engine.allocate_texture(desc)
    }
}

/// Opaque command recorded by a node during Execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCommand {
    /// Node that recorded the command
    pub node: NodeId,
    /// Command description
    pub label: String,
}

/// Capabilities available to nodes during Execute
#[derive(Debug, Default)]
pub struct RenderContext {
    frame: u64,
    commands: Mutex<Vec<RenderCommand>>,
}

impl RenderContext {
    /// Create the render context for one frame
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Frame index
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Record a command on behalf of a node
    pub fn record(&self, node: NodeId, label: impl Into<String>) {
        self.commands.lock().push(RenderCommand {
            node,
            label: label.into(),
        });
    }

    /// Number of commands recorded so far
    pub fn command_count(&self) -> usize {
        self.commands.lock().len()
    }

    /// Copy of the commands recorded so far
    pub fn commands(&self) -> Vec<RenderCommand> {
        self.commands.lock().clone()
    }

    /// Consume the context and return the recorded commands
    pub fn into_commands(self) -> Vec<RenderCommand> {
        self.commands.into_inner()
    }

    pub(crate) fn discard(&self) {
        self.commands.lock().clear();
    }
}
