//! Barriers synthesized by the graph compiler.
//!
//! The compiler produces backend-independent barrier records per batch ([`TextureTransition`], [`BufferTransition`] and
//! [`AccelerationStructureTransition`]). Right before recording they are resolved into [`TextureBarrier`], [`BufferBarrier`]
//! and [`AccelerationStructureBarrier`], which carry the concrete backend object, image layouts and stage/access masks.

use ash::vk;

use crate::backend::Backend;
use crate::graph::handle::{AccelerationStructureHandle, BufferHandle, RenderTargetHandle};
use crate::graph::resource::{TextureSubresource, TextureSurface};
use crate::graph::usage::{AccelerationStructureUsage, BufferUsage, TextureUsage};

/// Usage transition of a single texture surface, recorded before a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureTransition {
    pub handle: RenderTargetHandle,
    pub surface: TextureSurface,
    pub aspect: vk::ImageAspectFlags,
    pub before: TextureUsage,
    pub after: TextureUsage,
}

/// Usage transition of an imported buffer range, recorded before a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransition {
    pub handle: BufferHandle,
    pub before: BufferUsage,
    pub after: BufferUsage,
}

/// Usage transition of an acceleration structure, recorded before a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerationStructureTransition {
    pub handle: AccelerationStructureHandle,
    pub before: AccelerationStructureUsage,
    pub after: AccelerationStructureUsage,
}

/// Resolved image memory barrier, ready for the backend.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct TextureBarrier<'a, B: Backend> {
    pub texture: &'a B::Texture,
    pub subresource: TextureSubresource,
    /// Faces per array layer of the texture, needed to translate the subresource into array layers.
    pub faces_per_layer: u32,
    pub before: TextureUsage,
    pub after: TextureUsage,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl<'a, B: Backend> Clone for TextureBarrier<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Backend> Copy for TextureBarrier<'a, B> {}

impl<'a, B: Backend> TextureBarrier<'a, B> {
    /// Whether `other` transitions the same texture in exactly the same way, so both can share one barrier.
    pub(crate) fn same_transition(&self, other: &Self) -> bool {
        std::ptr::eq(self.texture, other.texture)
            && self.subresource.aspect == other.subresource.aspect
            && self.before == other.before
            && self.after == other.after
            && self.old_layout == other.old_layout
            && self.new_layout == other.new_layout
            && self.src_access == other.src_access
            && self.dst_access == other.dst_access
    }

    /// Try to grow this barrier's range by `other`. Succeeds when both ranges are adjacent along exactly one of the
    /// face, layer or mip axes and identical along the others.
    pub(crate) fn try_merge(&mut self, other: &Self) -> bool {
        if !self.same_transition(other) {
            return false;
        }
        let a = &mut self.subresource;
        let b = &other.subresource;
        let same_mips = a.mip_range() == b.mip_range();
        let same_layers = a.layer_range() == b.layer_range();
        let same_faces = a.face_range() == b.face_range();

        if same_mips && same_layers && a.face_range().end == b.first_face {
            a.face_count += b.face_count;
            true
        } else if same_mips
            && same_faces
            && a.layer_range().end == b.first_layer
            && (a.face_count == self.faces_per_layer)
        {
            a.layer_count += b.layer_count;
            true
        } else if same_layers && same_faces && a.mip_range().end == b.first_mip {
            a.mip_count += b.mip_count;
            true
        } else {
            false
        }
    }
}

/// Resolved buffer memory barrier, ready for the backend.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct BufferBarrier<'a, B: Backend> {
    pub buffer: &'a B::Buffer,
    pub offset: u64,
    pub range: u64,
    pub before: BufferUsage,
    pub after: BufferUsage,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl<'a, B: Backend> Clone for BufferBarrier<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Backend> Copy for BufferBarrier<'a, B> {}

/// Resolved acceleration structure barrier. Acceleration structures are synchronized with global memory barriers.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct AccelerationStructureBarrier<'a, B: Backend> {
    pub acceleration_structure: &'a B::AccelerationStructure,
    pub before: AccelerationStructureUsage,
    pub after: AccelerationStructureUsage,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl<'a, B: Backend> Clone for AccelerationStructureBarrier<'a, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, B: Backend> Copy for AccelerationStructureBarrier<'a, B> {}
