//! Per-frame render graph compiler and scheduler
//!
//! Every frame, the application declares a [`RenderGraphDescription`]: the render targets, imported textures, buffers
//! and acceleration structures it works with, and the passes that use them. The [`RenderGraph`] compiles this
//! declaration into batches of passes without hazards between them, synthesizes the barriers and layout transitions
//! between batches, records everything into command streams and submits them. Textures and framebuffers are allocated
//! through a [`ResourceCache`] and reused across frames.
//!
//! To get started, import everything through the prelude
//! ```
//! use framegraph::prelude::*;
//! ```
//!
//! # Example
//!
//! The graph talks to the GPU through the [`Backend`](crate::backend::Backend) trait. With the `vulkan` feature enabled,
//! [`VulkanBackend`](crate::backend::vulkan::VulkanBackend) implements it on top of an existing `ash` device.
//! ```ignore
//! use std::sync::Arc;
//! use framegraph::prelude::*;
//!
//! let backend = Arc::new(VulkanBackend::new(&entry, &instance, device, physical_device, queue_family_index)?);
//! let cache = Arc::new(ResourceCache::new());
//! let config = GraphConfigBuilder::new().statistics(true).build();
//! let mut graph = RenderGraph::new(backend.clone(), cache, config);
//! ```
//! Then, every frame:
//! ```ignore
//! let mut description = graph.new_description();
//! let color = description.new_render_target(RenderTargetDescription::new("ColorA", 1280, 720, vk::Format::R8G8B8A8_UNORM));
//! let swapchain = description.import_render_target(backend.import_texture(image, view, info), TextureUsage::empty());
//!
//! let mut draw = description.new_graphics_pass("draw");
//! draw.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color).clear([0.0, 0.0, 0.0, 1.0])));
//! draw.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
//! draw.set_work(|ctx| {
//!     let stream = ctx.command_stream();
//!     // Record draw commands
//!     Ok(())
//! });
//!
//! let mut blit = description.new_graphics_pass("blit");
//! blit.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(swapchain)));
//! blit.new_texture_dependency(color, TextureUsage::SAMPLED_FRAGMENT);
//! blit.new_texture_dependency(swapchain, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
//!
//! graph.compile_new_graph(description)?;
//! graph.record_and_submit(Some(&fence))?;
//! graph.reset()?;
//! ```
//! For further details, check out the following modules
//! - [`graph`] for declaring, compiling and recording graphs.
//! - [`cache`] for the objects kept alive between frames.
//! - [`backend`] for the graphics API abstraction and the Vulkan backend.
//! - [`config`] for capacities and runtime options.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod util;
