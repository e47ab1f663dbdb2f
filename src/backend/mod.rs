//! The backend seam of the render graph.
//!
//! The compiler and command emitter never talk to a graphics API directly. Everything they need from the outside world
//! goes through the [`Backend`] and [`CommandStream`] traits: creating textures and framebuffers for cache misses,
//! opening command streams, recording barriers and render pass scopes, and submitting the result.
//!
//! With the `vulkan` feature enabled, [`vulkan::VulkanBackend`] implements these traits on top of `ash` and
//! `gpu-allocator`.

use std::fmt::Debug;

use anyhow::Result;
use ash::vk;

use crate::graph::barrier::{AccelerationStructureBarrier, BufferBarrier, TextureBarrier};
use crate::graph::resource::{ClearValue, TextureInfo, TextureSubresource};

#[cfg(feature = "vulkan")]
pub mod vulkan;

/// An object owned by the backend with a stable identity across frames.
pub trait BackendObject: Clone + Debug + Send + Sync + 'static {
    /// Unique identifier of the underlying object. Two clones of the same object return the same value.
    fn uuid(&self) -> u64;
}

/// A texture object.
pub trait BackendTexture: BackendObject {
    /// Shape, format and supported usages of this texture.
    fn info(&self) -> &TextureInfo;
}

/// A buffer object.
pub trait BackendBuffer: BackendObject {
    /// Size in bytes.
    fn size(&self) -> u64;
}

/// Level of a command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStreamLevel {
    /// Submitted to a queue directly.
    Primary,
    /// Recorded independently and executed from a primary stream.
    Secondary,
}

/// Information needed to open a command stream.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct CommandStreamInfo<'a, B: Backend> {
    /// Debug name of the stream, usually the pass or batch it records.
    pub name: &'a str,
    pub level: CommandStreamLevel,
    /// For secondary streams recorded inside a render pass, the framebuffer of that pass.
    pub framebuffer: Option<&'a B::Framebuffer>,
}

/// One attachment of a framebuffer.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FramebufferAttachment<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub subresource: TextureSubresource,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub clear_value: ClearValue,
}

/// Information needed to create a framebuffer object for a graphics pass.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FramebufferCreateInfo<'a, B: Backend> {
    /// Name of the pass that owns this framebuffer.
    pub name: &'a str,
    pub color_attachments: Vec<FramebufferAttachment<'a, B>>,
    pub depth_stencil_attachment: Option<FramebufferAttachment<'a, B>>,
    pub render_area: vk::Rect2D,
}

/// Per-frame state needed to begin a render pass with a cached framebuffer.
#[derive(Debug, Clone)]
pub struct RenderPassBeginInfo {
    /// Layout of every color attachment at the time the pass runs.
    pub color_layouts: Vec<vk::ImageLayout>,
    /// Layout of the depth/stencil attachment, if any.
    pub depth_stencil_layout: Option<vk::ImageLayout>,
    pub render_area: vk::Rect2D,
    /// The pass body is recorded in secondary streams.
    pub secondary_streams: bool,
}

/// A stream of recorded commands.
pub trait CommandStream<B: Backend>: Send {
    /// Record one pipeline barrier containing all given transitions. Never called with all slices empty.
    fn pipeline_barrier(
        &mut self,
        textures: &[TextureBarrier<'_, B>],
        buffers: &[BufferBarrier<'_, B>],
        acceleration_structures: &[AccelerationStructureBarrier<'_, B>],
    );

    /// Begin a render pass on `framebuffer`.
    fn begin_render_pass(&mut self, framebuffer: &B::Framebuffer, info: &RenderPassBeginInfo);

    /// End the render pass started by the last [`begin_render_pass()`](CommandStream::begin_render_pass).
    fn end_render_pass(&mut self);

    /// Execute finished secondary streams, in order.
    fn execute_secondary(&mut self, streams: Vec<B::CommandStream>);

    /// Write a GPU timestamp into `query`.
    fn write_timestamp(&mut self, query: &B::TimestampQuery);

    /// Open a debug label region.
    fn begin_label(&mut self, _name: &str) {}

    /// Close the last debug label region.
    fn end_label(&mut self) {}

    /// Finish recording. No commands may be recorded afterwards.
    fn finish(&mut self) -> Result<()>;
}

/// Graphics API abstraction consumed by the render graph.
pub trait Backend: Send + Sync + Sized + 'static {
    type Texture: BackendTexture;
    type Buffer: BackendBuffer;
    type AccelerationStructure: BackendObject;
    type Framebuffer: Clone + Debug + Send + Sync + 'static;
    type CommandStream: CommandStream<Self> + 'static;
    type Fence: Debug;
    type TimestampQuery: Debug + Send + Sync + 'static;

    /// Allocate a new texture. Called on render target cache misses.
    fn create_texture(&self, info: &TextureInfo) -> Result<Self::Texture>;

    /// Create a framebuffer object. Called on framebuffer cache misses.
    fn create_framebuffer(&self, info: &FramebufferCreateInfo<'_, Self>) -> Result<Self::Framebuffer>;

    /// Open a new command stream, ready for recording.
    fn new_command_stream(&self, info: &CommandStreamInfo<'_, Self>) -> Result<Self::CommandStream>;

    /// Submit finished primary streams in order, signaling `fence` once all of them completed.
    fn submit(&self, streams: Vec<Self::CommandStream>, fence: Option<&Self::Fence>) -> Result<()>;

    /// Create a timestamp query object.
    fn new_timestamp_query(&self) -> Result<Self::TimestampQuery>;

    /// Read a timestamp in nanoseconds. Returns `None` if the GPU did not write it yet.
    fn read_timestamp(&self, query: &Self::TimestampQuery) -> Result<Option<u64>>;
}
