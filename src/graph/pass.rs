//! Passes are the nodes of a render graph.
//!
//! A pass is either a graphics pass, which may own a framebuffer and runs inside a render pass scope, or a non-graphics
//! pass (compute, transfer, ray tracing). Both kinds share the same dependency bookkeeping: every declared dependency
//! updates the pass' read and write bitsets, which the compiler uses for O(1) overlap tests between passes.
//!
//! Passes are created through a [`RenderGraphDescription`](crate::RenderGraphDescription) and configured through the returned
//! [`PassBuilder`] or [`GraphicsPassBuilder`].
//!
//! # Example
//! ```ignore
//! use framegraph::prelude::*;
//!
//! let color = description.new_render_target(RenderTargetDescription::new("ColorA", 256, 256, vk::Format::R8G8B8A8_UNORM));
//!
//! let mut pass = description.new_graphics_pass("gbuffer");
//! pass.set_framebuffer_info(FramebufferInfo::new().color(ColorAttachmentInfo::new(color).load_op(vk::AttachmentLoadOp::CLEAR)));
//! pass.new_texture_dependency(color, TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE);
//! pass.set_work(move |ctx| {
//!     let _stream = ctx.command_stream();
//!     // Record draws here.
//!     Ok(())
//! });
//! ```

use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};

use anyhow::Result;
use ash::vk;

use crate::backend::Backend;
use crate::config::{
    ACCELERATION_STRUCTURE_WORDS, BUFFER_WORDS, MAX_COLOR_ATTACHMENTS, RENDER_TARGET_WORDS,
};
use crate::graph::description::ResourceTable;
use crate::graph::handle::{AccelerationStructureHandle, BufferHandle, RenderTargetHandle};
use crate::graph::record::PassContext;
use crate::graph::resource::{ClearValue, TextureSubresource, TextureSurface};
use crate::graph::usage::{AccelerationStructureUsage, BufferUsage, ResourceUsage, TextureUsage};
use crate::util::bitset::BitSet;
use crate::util::hash::hash_f32;

pub(crate) type RenderTargetMask = BitSet<RENDER_TARGET_WORDS>;
pub(crate) type BufferMask = BitSet<BUFFER_WORDS>;
pub(crate) type AccelerationStructureMask = BitSet<ACCELERATION_STRUCTURE_WORDS>;

/// Capability set of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Runs on the graphics pipeline, optionally inside a render pass.
    Graphics,
    /// Compute, transfer or ray tracing work.
    NonGraphics,
}

/// Executes the work of a pass. Implemented for every suitable closure, so usually you pass a closure to
/// [`PassBuilder::set_work()`].
pub trait PassExecutor<B: Backend>: Send + Sync {
    /// Record the commands of this pass into the context's command stream.
    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<()>;
}

impl<B, F> PassExecutor<B> for F
where
    B: Backend,
    F: Fn(&mut PassContext<'_, B>) -> Result<()> + Send + Sync,
{
    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<()> {
        self(ctx)
    }
}

/// Boxed pass executor.
pub type BoxedPassFn<'cb, B> = Box<dyn PassExecutor<B> + 'cb>;

/// A dependency of a pass on (part of) a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDependency {
    pub handle: RenderTargetHandle,
    pub usage: TextureUsage,
    pub subresource: TextureSubresource,
}

/// A dependency of a pass on an imported buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDependency {
    pub handle: BufferHandle,
    pub usage: BufferUsage,
}

/// A dependency of a pass on an acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerationStructureDependency {
    pub handle: AccelerationStructureHandle,
    pub usage: AccelerationStructureUsage,
}

/// A color attachment of a graphics pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachmentInfo {
    pub handle: RenderTargetHandle,
    pub surface: TextureSurface,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachmentInfo {
    /// Attach mip 0, layer 0 of `handle`, loading and storing its contents.
    pub fn new(handle: RenderTargetHandle) -> Self {
        Self {
            handle,
            surface: TextureSurface::default(),
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0; 4],
        }
    }

    pub fn surface(mut self, surface: TextureSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn load_op(mut self, op: vk::AttachmentLoadOp) -> Self {
        self.load_op = op;
        self
    }

    pub fn store_op(mut self, op: vk::AttachmentStoreOp) -> Self {
        self.store_op = op;
        self
    }

    /// Clear to `color` on load.
    pub fn clear(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_color = color;
        self
    }
}

/// The depth/stencil attachment of a graphics pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAttachmentInfo {
    pub handle: RenderTargetHandle,
    pub surface: TextureSurface,
    /// Aspects that are attached. Empty means all aspects of the format.
    pub aspect: vk::ImageAspectFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl DepthStencilAttachmentInfo {
    pub fn new(handle: RenderTargetHandle) -> Self {
        Self {
            handle,
            surface: TextureSurface::default(),
            aspect: vk::ImageAspectFlags::empty(),
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }

    pub fn surface(mut self, surface: TextureSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn load_op(mut self, op: vk::AttachmentLoadOp) -> Self {
        self.load_op = op;
        self
    }

    pub fn store_op(mut self, op: vk::AttachmentStoreOp) -> Self {
        self.store_op = op;
        self
    }

    pub fn stencil_ops(mut self, load: vk::AttachmentLoadOp, store: vk::AttachmentStoreOp) -> Self {
        self.stencil_load_op = load;
        self.stencil_store_op = store;
        self
    }

    /// Clear depth and stencil on load.
    pub fn clear(mut self, depth: f32, stencil: u32) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_depth = depth;
        self.clear_stencil = stencil;
        self
    }

    pub(crate) fn clear_value(&self) -> ClearValue {
        ClearValue::DepthStencil {
            depth: self.clear_depth,
            stencil: self.clear_stencil,
        }
    }
}

/// Attachments and render area of a graphics pass.
#[derive(Debug, Clone, Default)]
pub struct FramebufferInfo {
    pub color_attachments: Vec<ColorAttachmentInfo>,
    pub depth_stencil_attachment: Option<DepthStencilAttachmentInfo>,
    /// Render area. `None` covers the whole first attachment.
    pub render_area: Option<vk::Rect2D>,
}

impl FramebufferInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a color attachment.
    pub fn color(mut self, attachment: ColorAttachmentInfo) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    /// Set the depth/stencil attachment.
    pub fn depth_stencil(mut self, attachment: DepthStencilAttachmentInfo) -> Self {
        self.depth_stencil_attachment = Some(attachment);
        self
    }

    pub fn render_area(mut self, area: vk::Rect2D) -> Self {
        self.render_area = Some(area);
        self
    }
}

impl Hash for FramebufferInfo {
    // Handles are per frame, so only the attachment configuration is hashed. The framebuffer cache adds
    // the identity of the attached textures.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.color_attachments.len().hash(state);
        for attachment in &self.color_attachments {
            attachment.surface.hash(state);
            attachment.load_op.hash(state);
            attachment.store_op.hash(state);
            attachment.clear_color.iter().for_each(|&c| hash_f32(c, state));
        }
        match &self.depth_stencil_attachment {
            None => state.write_u8(0),
            Some(ds) => {
                state.write_u8(1);
                ds.surface.hash(state);
                ds.aspect.hash(state);
                ds.load_op.hash(state);
                ds.store_op.hash(state);
                ds.stencil_load_op.hash(state);
                ds.stencil_store_op.hash(state);
                hash_f32(ds.clear_depth, state);
                ds.clear_stencil.hash(state);
            }
        }
        if let Some(area) = &self.render_area {
            area.offset.x.hash(state);
            area.offset.y.hash(state);
            area.extent.width.hash(state);
            area.extent.height.hash(state);
        }
    }
}

/// A declared pass. Created through [`RenderGraphDescription`](crate::RenderGraphDescription), consumed by the compiler.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Pass<'cb, B: Backend> {
    pub(crate) name: String,
    pub(crate) kind: PassKind,
    pub(crate) framebuffer: Option<FramebufferInfo>,
    pub(crate) texture_deps: Vec<TextureDependency>,
    pub(crate) buffer_deps: Vec<BufferDependency>,
    pub(crate) acceleration_structure_deps: Vec<AccelerationStructureDependency>,
    pub(crate) read_rt_mask: RenderTargetMask,
    pub(crate) write_rt_mask: RenderTargetMask,
    pub(crate) read_buffer_mask: BufferMask,
    pub(crate) write_buffer_mask: BufferMask,
    pub(crate) read_as_mask: AccelerationStructureMask,
    pub(crate) write_as_mask: AccelerationStructureMask,
    #[derivative(Debug = "ignore")]
    pub(crate) work: Option<BoxedPassFn<'cb, B>>,
    pub(crate) secondary_stream_count: u32,
}

/// A resource shared by two passes in a way that orders them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharedResource {
    RenderTarget(usize),
    Buffer(usize),
    AccelerationStructure(usize),
}

impl<'cb, B: Backend> Pass<'cb, B> {
    pub(crate) fn new(name: String, kind: PassKind) -> Self {
        Self {
            name,
            kind,
            framebuffer: None,
            texture_deps: vec![],
            buffer_deps: vec![],
            acceleration_structure_deps: vec![],
            read_rt_mask: Default::default(),
            write_rt_mask: Default::default(),
            read_buffer_mask: Default::default(),
            write_buffer_mask: Default::default(),
            read_as_mask: Default::default(),
            write_as_mask: Default::default(),
            work: None,
            secondary_stream_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn is_graphics(&self) -> bool {
        self.kind == PassKind::Graphics
    }

    /// Resources through which this pass must run after `earlier`. A resource orders two passes if at least one of
    /// them writes it and, for render targets, the accessed subresources overlap. Read after read never orders passes.
    pub(crate) fn shared_resources(&self, earlier: &Pass<'_, B>) -> Vec<SharedResource> {
        let mut shared = Vec::new();

        let rt_mask = (self.read_rt_mask & earlier.write_rt_mask)
            | (self.write_rt_mask & earlier.read_rt_mask)
            | (self.write_rt_mask & earlier.write_rt_mask);
        for index in rt_mask.iter() {
            let conflict = self.texture_deps.iter().filter(|dep| dep.handle.index() == index).any(|dep| {
                earlier.texture_deps.iter().filter(|other| other.handle.index() == index).any(|other| {
                    (dep.usage | other.usage).writes() && dep.subresource.overlaps(&other.subresource)
                })
            });
            if conflict {
                shared.push(SharedResource::RenderTarget(index));
            }
        }

        let buffer_mask = (self.read_buffer_mask & earlier.write_buffer_mask)
            | (self.write_buffer_mask & earlier.read_buffer_mask)
            | (self.write_buffer_mask & earlier.write_buffer_mask);
        for index in buffer_mask.iter() {
            let conflict = self.buffer_deps.iter().filter(|dep| dep.handle.index() == index).any(|dep| {
                earlier
                    .buffer_deps
                    .iter()
                    .filter(|other| other.handle.index() == index)
                    .any(|other| (dep.usage | other.usage).writes())
            });
            if conflict {
                shared.push(SharedResource::Buffer(index));
            }
        }

        let as_mask = (self.read_as_mask & earlier.write_as_mask)
            | (self.write_as_mask & earlier.read_as_mask)
            | (self.write_as_mask & earlier.write_as_mask);
        for index in as_mask.iter() {
            let conflict = self
                .acceleration_structure_deps
                .iter()
                .filter(|dep| dep.handle.index() == index)
                .any(|dep| {
                    earlier
                        .acceleration_structure_deps
                        .iter()
                        .filter(|other| other.handle.index() == index)
                        .any(|other| (dep.usage | other.usage).writes())
                });
            if conflict {
                shared.push(SharedResource::AccelerationStructure(index));
            }
        }

        shared
    }

    fn validate_usage<U: ResourceUsage>(&self, usage: U, resource: &str) {
        assert!(
            usage.reads() || usage.writes(),
            "pass `{}`: usage {usage:?} of `{resource}` neither reads nor writes",
            self.name
        );
        match self.kind {
            PassKind::Graphics => assert!(
                !usage.intersects(U::compute_mask()),
                "graphics pass `{}` declares compute usage {usage:?} on `{resource}`",
                self.name
            ),
            PassKind::NonGraphics => assert!(
                !usage.intersects(U::graphics_mask()),
                "non-graphics pass `{}` declares graphics usage {usage:?} on `{resource}`",
                self.name
            ),
        }
    }
}

/// Configures a pass right after its creation.
pub struct PassBuilder<'a, 'cb, B: Backend> {
    pub(crate) pass: &'a mut Pass<'cb, B>,
    pub(crate) resources: &'a mut ResourceTable<B>,
}

impl<'a, 'cb, B: Backend> PassBuilder<'a, 'cb, B> {
    pub fn name(&self) -> &str {
        &self.pass.name
    }

    /// Declare a dependency on the whole render target.
    pub fn new_texture_dependency(&mut self, handle: RenderTargetHandle, usage: TextureUsage) -> &mut Self {
        let whole = TextureSubresource::mips(0, 0);
        self.new_texture_dependency_subresource(handle, usage, whole)
    }

    /// Declare a dependency on part of a render target. Zero mip, layer or face counts mean "all".
    pub fn new_texture_dependency_subresource(
        &mut self,
        handle: RenderTargetHandle,
        usage: TextureUsage,
        subresource: TextureSubresource,
    ) -> &mut Self {
        let entry = self.resources.render_target_mut(handle);
        let subresource = subresource.fixup(&entry.info);
        self.pass.validate_usage(usage, &entry.info.name);

        #[cfg(debug_assertions)]
        for existing in self.pass.texture_deps.iter().filter(|dep| dep.handle == handle) {
            if existing.subresource.overlaps(&subresource) {
                assert!(
                    existing.usage == usage || !(existing.usage | usage).writes(),
                    "pass `{}` declares conflicting usages {:?} and {usage:?} on `{}`",
                    self.pass.name,
                    existing.usage,
                    entry.info.name
                );
            }
        }

        entry.usage_derived_by_deps |= usage;
        if usage.reads() {
            self.pass.read_rt_mask.set(handle.index());
        }
        if usage.writes() {
            self.pass.write_rt_mask.set(handle.index());
        }
        self.pass.texture_deps.push(TextureDependency {
            handle,
            usage,
            subresource,
        });
        self
    }

    /// Declare a dependency on an imported buffer range.
    pub fn new_buffer_dependency(&mut self, handle: BufferHandle, usage: BufferUsage) -> &mut Self {
        let name = self.resources.buffer(handle).name.clone();
        self.pass.validate_usage(usage, &name);
        for existing in self.pass.buffer_deps.iter().filter(|dep| dep.handle == handle) {
            assert!(
                existing.usage == usage || !(existing.usage | usage).writes(),
                "pass `{}` declares conflicting usages {:?} and {usage:?} on `{name}`",
                self.pass.name,
                existing.usage
            );
        }

        if usage.reads() {
            self.pass.read_buffer_mask.set(handle.index());
        }
        if usage.writes() {
            self.pass.write_buffer_mask.set(handle.index());
        }
        self.pass.buffer_deps.push(BufferDependency {
            handle,
            usage,
        });
        self
    }

    /// Declare a dependency on an imported acceleration structure.
    pub fn new_acceleration_structure_dependency(
        &mut self,
        handle: AccelerationStructureHandle,
        usage: AccelerationStructureUsage,
    ) -> &mut Self {
        let name = self.resources.acceleration_structure(handle).name.clone();
        self.pass.validate_usage(usage, &name);
        for existing in self.pass.acceleration_structure_deps.iter().filter(|dep| dep.handle == handle) {
            assert!(
                existing.usage == usage || !(existing.usage | usage).writes(),
                "pass `{}` declares conflicting usages {:?} and {usage:?} on `{name}`",
                self.pass.name,
                existing.usage
            );
        }

        if usage.reads() {
            self.pass.read_as_mask.set(handle.index());
        }
        if usage.writes() {
            self.pass.write_as_mask.set(handle.index());
        }
        self.pass.acceleration_structure_deps.push(AccelerationStructureDependency {
            handle,
            usage,
        });
        self
    }

    /// Set the work of this pass. It is recorded directly into the batch's primary command stream.
    pub fn set_work<F>(&mut self, work: F) -> &mut Self
    where
        F: Fn(&mut PassContext<'_, B>) -> Result<()> + Send + Sync + 'cb, {
        self.pass.work = Some(Box::new(work));
        self.pass.secondary_stream_count = 0;
        self
    }

    /// Set the work of this pass, split over `count` secondary command streams. The callback runs once per stream,
    /// possibly on different threads, and can tell the streams apart through
    /// [`PassContext::secondary_index()`](crate::PassContext::secondary_index).
    pub fn set_work_parallel<F>(&mut self, count: u32, work: F) -> &mut Self
    where
        F: Fn(&mut PassContext<'_, B>) -> Result<()> + Send + Sync + 'cb, {
        assert!(count > 0, "pass `{}` requested zero secondary command streams", self.pass.name);
        self.pass.work = Some(Box::new(work));
        self.pass.secondary_stream_count = count;
        self
    }
}

/// Configures a graphics pass. Dereferences to [`PassBuilder`] for dependency declaration.
pub struct GraphicsPassBuilder<'a, 'cb, B: Backend> {
    pub(crate) builder: PassBuilder<'a, 'cb, B>,
}

impl<'a, 'cb, B: Backend> GraphicsPassBuilder<'a, 'cb, B> {
    /// Set the attachments of this pass. The pass will run inside a render pass with these attachments. Attachments still
    /// need a dependency with a framebuffer usage to be synchronized.
    pub fn set_framebuffer_info(&mut self, mut info: FramebufferInfo) -> &mut Self {
        let name = self.builder.pass.name.clone();
        assert!(
            info.color_attachments.len() <= MAX_COLOR_ATTACHMENTS,
            "pass `{name}` has {} color attachments, MAX_COLOR_ATTACHMENTS is {MAX_COLOR_ATTACHMENTS}",
            info.color_attachments.len()
        );
        assert!(
            !info.color_attachments.is_empty() || info.depth_stencil_attachment.is_some(),
            "pass `{name}` sets a framebuffer without attachments"
        );

        for attachment in &info.color_attachments {
            let entry = self.builder.resources.render_target(attachment.handle);
            assert!(
                entry.info.aspect().is_empty(),
                "pass `{name}` attaches depth/stencil texture `{}` as a color attachment",
                entry.info.name
            );
            TextureSubresource::surface(attachment.surface).fixup(&entry.info);
        }
        if let Some(ds) = info.depth_stencil_attachment.as_mut() {
            let entry = self.builder.resources.render_target(ds.handle);
            let format_aspect = entry.info.aspect();
            assert!(
                !format_aspect.is_empty(),
                "pass `{name}` attaches color texture `{}` as depth/stencil",
                entry.info.name
            );
            if ds.aspect.is_empty() {
                ds.aspect = format_aspect;
            }
            TextureSubresource::surface(ds.surface).with_aspect(ds.aspect).fixup(&entry.info);
        }

        self.builder.pass.framebuffer = Some(info);
        self
    }
}

impl<'a, 'cb, B: Backend> Deref for GraphicsPassBuilder<'a, 'cb, B> {
    type Target = PassBuilder<'a, 'cb, B>;

    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl<'a, 'cb, B: Backend> DerefMut for GraphicsPassBuilder<'a, 'cb, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}
