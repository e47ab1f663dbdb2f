pub use ash::vk;

pub use crate::error::Error;

pub use crate::config::{GraphConfig, GraphConfigBuilder};
pub use crate::config::{
    MAX_ACCELERATION_STRUCTURES, MAX_BUFFERS, MAX_COLOR_ATTACHMENTS, MAX_FRAMES_IN_FLIGHT, MAX_PASSES,
    MAX_RENDER_TARGETS, PERIODIC_CLEANUP_EVERY,
};

pub use crate::backend::{
    Backend, BackendBuffer, BackendObject, BackendTexture, CommandStream, CommandStreamInfo, CommandStreamLevel,
    FramebufferAttachment, FramebufferCreateInfo, RenderPassBeginInfo,
};
#[cfg(feature = "vulkan")]
pub use crate::backend::vulkan::*;

pub use crate::cache::{FramebufferCache, ImportedResourceTracker, RenderTargetCache, ResourceCache};

pub use crate::graph::barrier::*;
pub use crate::graph::compile::{BakedGraph, BakedPass, Batch, DependencyGraph};
pub use crate::graph::description::{RenderGraphDescription, ResourceTable};
pub use crate::graph::dot::GraphViz;
pub use crate::graph::handle::*;
pub use crate::graph::pass::*;
pub use crate::graph::record::{BufferView, PassContext};
pub use crate::graph::render_graph::RenderGraph;
pub use crate::graph::resource::*;
pub use crate::graph::statistics::Statistics;
pub use crate::graph::usage::*;
