//! The render graph is rebuilt every frame. Each pass declares the resources it touches and how it uses them, and the
//! graph derives everything else: the order passes run in, which passes can share a batch, the barriers and layout
//! transitions between batches, and the framebuffers graphics passes render into.
//!
//! Resources are either new render targets, allocated from a [`ResourceCache`](crate::ResourceCache) on first use and
//! reused across frames, or imported textures, buffers and acceleration structures owned by the application. All of them
//! are addressed through generation-scoped [`Handle`](handle::Handle)s that become invalid when the frame is reset.
//!
//! Through the [`GraphViz`](dot::GraphViz) trait, a compiled graph can be exported as a graphviz-compatible dot file.
//!
//! # Example
//!
//! ```ignore
//! use framegraph::prelude::*;
//!
//! let mut description = graph.new_description();
//! let color = description.new_render_target(RenderTargetDescription::new("ColorA", 1920, 1080, vk::Format::R8G8B8A8_UNORM));
//! let swapchain = description.import_render_target(swapchain_image, TextureUsage::empty());
//!
//! let mut gbuffer = description.new_graphics_pass("gbuffer");
//! gbuffer.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color).clear([0.0; 4])));
//! gbuffer.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
//! gbuffer.set_work(|ctx| {
//!     // Record draws into ctx.command_stream()
//!     Ok(())
//! });
//!
//! let mut resolve = description.new_graphics_pass("resolve");
//! resolve.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(swapchain)));
//! resolve.new_texture_dependency(color, TextureUsage::SAMPLED_FRAGMENT);
//! resolve.new_texture_dependency(swapchain, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
//!
//! graph.compile_new_graph(description)?;
//! graph.record_and_submit(Some(&fence))?;
//! graph.reset()?;
//! ```
//!
//! # Recording
//!
//! Batches are recorded in order into primary command streams. Passes that request secondary streams through
//! [`PassBuilder::set_work_parallel()`](pass::PassBuilder::set_work_parallel) have them recorded up front, in parallel
//! when the `rayon` feature is enabled, and executed in declaration order.

pub mod barrier;
pub mod compile;
pub mod description;
pub mod dot;
pub mod handle;
pub mod pass;
pub mod record;
pub mod render_graph;
pub mod resource;
pub mod statistics;
pub mod usage;
