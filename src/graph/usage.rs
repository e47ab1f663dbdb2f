//! Usage bitmasks for graph resources and their translation into Vulkan synchronization state.
//!
//! A usage describes how a pass accesses a resource. The graph never asks for layouts or pipeline stages directly,
//! they are derived from the usage through the pure functions in this module:
//! - [`texture_layout`] picks the image layout for a usage at a given mip level.
//! - [`texture_stage_access`], [`buffer_stage_access`] and [`acceleration_structure_stage_access`] produce the
//!   stage and access masks used in a pipeline barrier.

use std::fmt::Debug;

use ash::vk;
use bitflags::{bitflags, Flags};

bitflags! {
    /// How a pass uses a texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        const SAMPLED_GEOMETRY = 1 << 0;
        const SAMPLED_FRAGMENT = 1 << 1;
        const SAMPLED_COMPUTE = 1 << 2;
        const SAMPLED_TRACE_RAYS = 1 << 3;
        const IMAGE_GEOMETRY_READ = 1 << 4;
        const IMAGE_GEOMETRY_WRITE = 1 << 5;
        const IMAGE_FRAGMENT_READ = 1 << 6;
        const IMAGE_FRAGMENT_WRITE = 1 << 7;
        const IMAGE_COMPUTE_READ = 1 << 8;
        const IMAGE_COMPUTE_WRITE = 1 << 9;
        const IMAGE_TRACE_RAYS_READ = 1 << 10;
        const IMAGE_TRACE_RAYS_WRITE = 1 << 11;
        const FRAMEBUFFER_ATTACHMENT_READ = 1 << 12;
        const FRAMEBUFFER_ATTACHMENT_WRITE = 1 << 13;
        const FRAMEBUFFER_SHADING_RATE = 1 << 14;
        const TRANSFER_DESTINATION = 1 << 15;
        const GENERATE_MIPMAPS = 1 << 16;
        const PRESENT = 1 << 17;

        const ALL_SAMPLED = Self::SAMPLED_GEOMETRY.bits()
            | Self::SAMPLED_FRAGMENT.bits()
            | Self::SAMPLED_COMPUTE.bits()
            | Self::SAMPLED_TRACE_RAYS.bits();
        const ALL_IMAGE = Self::IMAGE_GEOMETRY_READ.bits()
            | Self::IMAGE_GEOMETRY_WRITE.bits()
            | Self::IMAGE_FRAGMENT_READ.bits()
            | Self::IMAGE_FRAGMENT_WRITE.bits()
            | Self::IMAGE_COMPUTE_READ.bits()
            | Self::IMAGE_COMPUTE_WRITE.bits()
            | Self::IMAGE_TRACE_RAYS_READ.bits()
            | Self::IMAGE_TRACE_RAYS_WRITE.bits();
        const ALL_FRAMEBUFFER = Self::FRAMEBUFFER_ATTACHMENT_READ.bits() | Self::FRAMEBUFFER_ATTACHMENT_WRITE.bits();
        const ALL_GRAPHICS = Self::SAMPLED_GEOMETRY.bits()
            | Self::SAMPLED_FRAGMENT.bits()
            | Self::IMAGE_GEOMETRY_READ.bits()
            | Self::IMAGE_GEOMETRY_WRITE.bits()
            | Self::IMAGE_FRAGMENT_READ.bits()
            | Self::IMAGE_FRAGMENT_WRITE.bits()
            | Self::ALL_FRAMEBUFFER.bits()
            | Self::FRAMEBUFFER_SHADING_RATE.bits();
        const ALL_COMPUTE = Self::SAMPLED_COMPUTE.bits() | Self::IMAGE_COMPUTE_READ.bits() | Self::IMAGE_COMPUTE_WRITE.bits();
        const ALL_READ = Self::ALL_SAMPLED.bits()
            | Self::IMAGE_GEOMETRY_READ.bits()
            | Self::IMAGE_FRAGMENT_READ.bits()
            | Self::IMAGE_COMPUTE_READ.bits()
            | Self::IMAGE_TRACE_RAYS_READ.bits()
            | Self::FRAMEBUFFER_ATTACHMENT_READ.bits()
            | Self::FRAMEBUFFER_SHADING_RATE.bits()
            | Self::GENERATE_MIPMAPS.bits()
            | Self::PRESENT.bits();
        const ALL_WRITE = Self::IMAGE_GEOMETRY_WRITE.bits()
            | Self::IMAGE_FRAGMENT_WRITE.bits()
            | Self::IMAGE_COMPUTE_WRITE.bits()
            | Self::IMAGE_TRACE_RAYS_WRITE.bits()
            | Self::FRAMEBUFFER_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_DESTINATION.bits()
            | Self::GENERATE_MIPMAPS.bits();
    }
}

bitflags! {
    /// How a pass uses a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const UNIFORM_GEOMETRY = 1 << 0;
        const UNIFORM_FRAGMENT = 1 << 1;
        const UNIFORM_COMPUTE = 1 << 2;
        const UNIFORM_TRACE_RAYS = 1 << 3;
        const STORAGE_GEOMETRY_READ = 1 << 4;
        const STORAGE_GEOMETRY_WRITE = 1 << 5;
        const STORAGE_FRAGMENT_READ = 1 << 6;
        const STORAGE_FRAGMENT_WRITE = 1 << 7;
        const STORAGE_COMPUTE_READ = 1 << 8;
        const STORAGE_COMPUTE_WRITE = 1 << 9;
        const STORAGE_TRACE_RAYS_READ = 1 << 10;
        const STORAGE_TRACE_RAYS_WRITE = 1 << 11;
        const TEXTURE_GEOMETRY_READ = 1 << 12;
        const TEXTURE_GEOMETRY_WRITE = 1 << 13;
        const TEXTURE_FRAGMENT_READ = 1 << 14;
        const TEXTURE_FRAGMENT_WRITE = 1 << 15;
        const TEXTURE_COMPUTE_READ = 1 << 16;
        const TEXTURE_COMPUTE_WRITE = 1 << 17;
        const TEXTURE_TRACE_RAYS_READ = 1 << 18;
        const TEXTURE_TRACE_RAYS_WRITE = 1 << 19;
        const INDEX = 1 << 20;
        const VERTEX = 1 << 21;
        const INDIRECT_COMPUTE = 1 << 22;
        const INDIRECT_DRAW = 1 << 23;
        const INDIRECT_TRACE_RAYS = 1 << 24;
        const TRANSFER_SOURCE = 1 << 25;
        const TRANSFER_DESTINATION = 1 << 26;
        const ACCELERATION_STRUCTURE_BUILD = 1 << 27;
        const SHADER_BINDING_TABLE = 1 << 28;

        const ALL_UNIFORM = Self::UNIFORM_GEOMETRY.bits()
            | Self::UNIFORM_FRAGMENT.bits()
            | Self::UNIFORM_COMPUTE.bits()
            | Self::UNIFORM_TRACE_RAYS.bits();
        const ALL_INDIRECT = Self::INDIRECT_COMPUTE.bits() | Self::INDIRECT_DRAW.bits() | Self::INDIRECT_TRACE_RAYS.bits();
        const ALL_TRANSFER = Self::TRANSFER_SOURCE.bits() | Self::TRANSFER_DESTINATION.bits();
        const ALL_GEOMETRY = Self::UNIFORM_GEOMETRY.bits()
            | Self::STORAGE_GEOMETRY_READ.bits()
            | Self::STORAGE_GEOMETRY_WRITE.bits()
            | Self::TEXTURE_GEOMETRY_READ.bits()
            | Self::TEXTURE_GEOMETRY_WRITE.bits();
        const ALL_FRAGMENT = Self::UNIFORM_FRAGMENT.bits()
            | Self::STORAGE_FRAGMENT_READ.bits()
            | Self::STORAGE_FRAGMENT_WRITE.bits()
            | Self::TEXTURE_FRAGMENT_READ.bits()
            | Self::TEXTURE_FRAGMENT_WRITE.bits();
        const ALL_GRAPHICS = Self::ALL_GEOMETRY.bits()
            | Self::ALL_FRAGMENT.bits()
            | Self::INDEX.bits()
            | Self::VERTEX.bits()
            | Self::INDIRECT_DRAW.bits();
        const ALL_COMPUTE = Self::UNIFORM_COMPUTE.bits()
            | Self::STORAGE_COMPUTE_READ.bits()
            | Self::STORAGE_COMPUTE_WRITE.bits()
            | Self::TEXTURE_COMPUTE_READ.bits()
            | Self::TEXTURE_COMPUTE_WRITE.bits()
            | Self::INDIRECT_COMPUTE.bits();
        const ALL_TRACE_RAYS = Self::UNIFORM_TRACE_RAYS.bits()
            | Self::STORAGE_TRACE_RAYS_READ.bits()
            | Self::STORAGE_TRACE_RAYS_WRITE.bits()
            | Self::TEXTURE_TRACE_RAYS_READ.bits()
            | Self::TEXTURE_TRACE_RAYS_WRITE.bits()
            | Self::INDIRECT_TRACE_RAYS.bits()
            | Self::SHADER_BINDING_TABLE.bits();
        const ALL_SHADER_READ = Self::STORAGE_GEOMETRY_READ.bits()
            | Self::STORAGE_FRAGMENT_READ.bits()
            | Self::STORAGE_COMPUTE_READ.bits()
            | Self::STORAGE_TRACE_RAYS_READ.bits()
            | Self::TEXTURE_GEOMETRY_READ.bits()
            | Self::TEXTURE_FRAGMENT_READ.bits()
            | Self::TEXTURE_COMPUTE_READ.bits()
            | Self::TEXTURE_TRACE_RAYS_READ.bits()
            | Self::SHADER_BINDING_TABLE.bits();
        const ALL_SHADER_WRITE = Self::STORAGE_GEOMETRY_WRITE.bits()
            | Self::STORAGE_FRAGMENT_WRITE.bits()
            | Self::STORAGE_COMPUTE_WRITE.bits()
            | Self::STORAGE_TRACE_RAYS_WRITE.bits()
            | Self::TEXTURE_GEOMETRY_WRITE.bits()
            | Self::TEXTURE_FRAGMENT_WRITE.bits()
            | Self::TEXTURE_COMPUTE_WRITE.bits()
            | Self::TEXTURE_TRACE_RAYS_WRITE.bits();
        const ALL_READ = Self::ALL_UNIFORM.bits()
            | Self::ALL_SHADER_READ.bits()
            | Self::INDEX.bits()
            | Self::VERTEX.bits()
            | Self::ALL_INDIRECT.bits()
            | Self::TRANSFER_SOURCE.bits()
            | Self::ACCELERATION_STRUCTURE_BUILD.bits();
        const ALL_WRITE = Self::ALL_SHADER_WRITE.bits() | Self::TRANSFER_DESTINATION.bits();
    }
}

bitflags! {
    /// How a pass uses an acceleration structure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureUsage: u32 {
        const BUILD = 1 << 0;
        const ATTACH = 1 << 1;
        const GEOMETRY_READ = 1 << 2;
        const FRAGMENT_READ = 1 << 3;
        const COMPUTE_READ = 1 << 4;
        const TRACE_RAYS_READ = 1 << 5;

        const ALL_GRAPHICS = Self::GEOMETRY_READ.bits() | Self::FRAGMENT_READ.bits();
        const ALL_COMPUTE = Self::COMPUTE_READ.bits();
        const ALL_READ = Self::ATTACH.bits()
            | Self::GEOMETRY_READ.bits()
            | Self::FRAGMENT_READ.bits()
            | Self::COMPUTE_READ.bits()
            | Self::TRACE_RAYS_READ.bits();
        const ALL_WRITE = Self::BUILD.bits();
    }
}

/// Shared behaviour of the three usage masks.
pub trait ResourceUsage: Flags + Copy + PartialEq + Debug {
    /// All bits that read the resource.
    fn read_mask() -> Self;
    /// All bits that write the resource.
    fn write_mask() -> Self;
    /// Bits only a graphics pass may use.
    fn graphics_mask() -> Self;
    /// Bits only a non-graphics pass may use.
    fn compute_mask() -> Self;

    /// Whether this usage reads the resource.
    fn reads(&self) -> bool {
        self.intersects(Self::read_mask())
    }

    /// Whether this usage writes the resource.
    fn writes(&self) -> bool {
        self.intersects(Self::write_mask())
    }
}

impl ResourceUsage for TextureUsage {
    fn read_mask() -> Self {
        Self::ALL_READ
    }

    fn write_mask() -> Self {
        Self::ALL_WRITE
    }

    fn graphics_mask() -> Self {
        Self::ALL_GRAPHICS
    }

    fn compute_mask() -> Self {
        Self::ALL_COMPUTE
    }
}

impl ResourceUsage for BufferUsage {
    fn read_mask() -> Self {
        Self::ALL_READ
    }

    fn write_mask() -> Self {
        Self::ALL_WRITE
    }

    fn graphics_mask() -> Self {
        Self::ALL_GRAPHICS
    }

    fn compute_mask() -> Self {
        Self::ALL_COMPUTE
    }
}

impl ResourceUsage for AccelerationStructureUsage {
    fn read_mask() -> Self {
        Self::ALL_READ
    }

    fn write_mask() -> Self {
        Self::ALL_WRITE
    }

    fn graphics_mask() -> Self {
        Self::ALL_GRAPHICS
    }

    fn compute_mask() -> Self {
        Self::ALL_COMPUTE
    }
}

/// Format a usage as `A | B`, or `NONE` when empty.
pub fn usage_string<U: ResourceUsage>(usage: U) -> String {
    if usage.is_empty() {
        return String::from("NONE");
    }
    usage.iter_names().map(|(name, _)| name).collect::<Vec<_>>().join(" | ")
}

const GEOMETRY_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER.as_raw()
        | vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER.as_raw()
        | vk::PipelineStageFlags2::GEOMETRY_SHADER.as_raw(),
);

const FRAGMENT_TEST_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Image layout of a texture surface used with `usage`. `mip` and `mip_count` only matter for mipmap generation,
/// where every level but the last is a transfer source.
///
/// Mixed usages that have no dedicated layout fall back to `GENERAL`.
pub fn texture_layout(usage: TextureUsage, mip: u32, mip_count: u32, depth_stencil: bool) -> vk::ImageLayout {
    debug_assert!(mip < mip_count, "mip {mip} out of range for texture with {mip_count} levels");
    let last_level = mip + 1 == mip_count;
    let only = |mask: TextureUsage| (usage - mask).is_empty();

    if usage.is_empty() {
        vk::ImageLayout::UNDEFINED
    } else if depth_stencil {
        if only(TextureUsage::ALL_SAMPLED | TextureUsage::FRAMEBUFFER_ATTACHMENT_READ) {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        } else if only(TextureUsage::ALL_FRAMEBUFFER) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::GENERAL
        }
    } else if only(TextureUsage::ALL_FRAMEBUFFER) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if only(TextureUsage::FRAMEBUFFER_SHADING_RATE) {
        vk::ImageLayout::FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR
    } else if only(TextureUsage::ALL_IMAGE) {
        vk::ImageLayout::GENERAL
    } else if only(TextureUsage::ALL_SAMPLED) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if usage == TextureUsage::GENERATE_MIPMAPS {
        if last_level {
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        } else {
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        }
    } else if usage == TextureUsage::TRANSFER_DESTINATION {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if usage == TextureUsage::PRESENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else {
        vk::ImageLayout::GENERAL
    }
}

/// Pipeline stages and access mask of a texture usage. `src` selects the source side of a barrier, which matters
/// for mipmap generation. An empty source stage becomes `TOP_OF_PIPE`.
pub fn texture_stage_access(
    usage: TextureUsage,
    src: bool,
    mip: u32,
    mip_count: u32,
    depth_stencil: bool,
) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    let mut stages = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;

    if usage.intersects(TextureUsage::SAMPLED_GEOMETRY | TextureUsage::IMAGE_GEOMETRY_READ) {
        stages |= GEOMETRY_STAGES;
        access |= vk::AccessFlags2::SHADER_READ;
    }
    if usage.contains(TextureUsage::IMAGE_GEOMETRY_WRITE) {
        stages |= GEOMETRY_STAGES;
        access |= vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.intersects(TextureUsage::SAMPLED_FRAGMENT | TextureUsage::IMAGE_FRAGMENT_READ) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
        access |= vk::AccessFlags2::SHADER_READ;
    }
    if usage.contains(TextureUsage::IMAGE_FRAGMENT_WRITE) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
        access |= vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.intersects(TextureUsage::SAMPLED_COMPUTE | TextureUsage::IMAGE_COMPUTE_READ) {
        stages |= vk::PipelineStageFlags2::COMPUTE_SHADER;
        access |= vk::AccessFlags2::SHADER_READ;
    }
    if usage.contains(TextureUsage::IMAGE_COMPUTE_WRITE) {
        stages |= vk::PipelineStageFlags2::COMPUTE_SHADER;
        access |= vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.intersects(TextureUsage::SAMPLED_TRACE_RAYS | TextureUsage::IMAGE_TRACE_RAYS_READ) {
        stages |= vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR;
        access |= vk::AccessFlags2::SHADER_READ;
    }
    if usage.contains(TextureUsage::IMAGE_TRACE_RAYS_WRITE) {
        stages |= vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR;
        access |= vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.contains(TextureUsage::FRAMEBUFFER_ATTACHMENT_READ) {
        if depth_stencil {
            stages |= FRAGMENT_TEST_STAGES;
            access |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ;
        } else {
            stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
            access |= vk::AccessFlags2::COLOR_ATTACHMENT_READ;
        }
    }
    if usage.contains(TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE) {
        if depth_stencil {
            stages |= FRAGMENT_TEST_STAGES;
            access |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        } else {
            stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
            access |= vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
        }
    }
    if usage.contains(TextureUsage::FRAMEBUFFER_SHADING_RATE) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
        access |= vk::AccessFlags2::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR;
    }
    if usage.contains(TextureUsage::GENERATE_MIPMAPS) {
        stages |= vk::PipelineStageFlags2::TRANSFER;
        let last_level = mip + 1 == mip_count;
        if src && last_level {
            access |= vk::AccessFlags2::TRANSFER_WRITE;
        } else {
            access |= vk::AccessFlags2::TRANSFER_READ;
        }
    }
    if usage.contains(TextureUsage::TRANSFER_DESTINATION) {
        stages |= vk::PipelineStageFlags2::TRANSFER;
        access |= vk::AccessFlags2::TRANSFER_WRITE;
    }
    if usage.contains(TextureUsage::PRESENT) {
        stages |= vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
        access |= vk::AccessFlags2::MEMORY_READ;
    }

    if src && stages.is_empty() {
        stages = vk::PipelineStageFlags2::TOP_OF_PIPE;
    }

    (stages, access)
}

/// Pipeline stages and access mask of a buffer usage.
pub fn buffer_stage_access(usage: BufferUsage) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    let mut stages = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;

    if usage.intersects(BufferUsage::ALL_INDIRECT) {
        stages |= vk::PipelineStageFlags2::DRAW_INDIRECT;
        access |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
    }
    if usage.intersects(BufferUsage::INDEX | BufferUsage::VERTEX) {
        stages |= vk::PipelineStageFlags2::VERTEX_INPUT;
    }
    if usage.contains(BufferUsage::INDEX) {
        access |= vk::AccessFlags2::INDEX_READ;
    }
    if usage.contains(BufferUsage::VERTEX) {
        access |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ;
    }
    if usage.intersects(BufferUsage::ALL_GEOMETRY) {
        stages |= GEOMETRY_STAGES;
    }
    if usage.intersects(BufferUsage::ALL_FRAGMENT) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
    }
    if usage.intersects(BufferUsage::ALL_COMPUTE - BufferUsage::INDIRECT_COMPUTE) {
        stages |= vk::PipelineStageFlags2::COMPUTE_SHADER;
    }
    if usage.intersects(BufferUsage::ALL_TRACE_RAYS - BufferUsage::INDIRECT_TRACE_RAYS) {
        stages |= vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR;
    }
    if usage.intersects(BufferUsage::ALL_UNIFORM) {
        access |= vk::AccessFlags2::UNIFORM_READ;
    }
    if usage.intersects(BufferUsage::ALL_SHADER_READ) {
        access |= vk::AccessFlags2::SHADER_READ;
    }
    if usage.intersects(BufferUsage::ALL_SHADER_WRITE) {
        access |= vk::AccessFlags2::SHADER_WRITE;
    }
    if usage.intersects(BufferUsage::ALL_TRANSFER) {
        stages |= vk::PipelineStageFlags2::TRANSFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SOURCE) {
        access |= vk::AccessFlags2::TRANSFER_READ;
    }
    if usage.contains(BufferUsage::TRANSFER_DESTINATION) {
        access |= vk::AccessFlags2::TRANSFER_WRITE;
    }
    if usage.contains(BufferUsage::ACCELERATION_STRUCTURE_BUILD) {
        stages |= vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR;
        access |= vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR;
    }

    if stages.is_empty() {
        stages = vk::PipelineStageFlags2::TOP_OF_PIPE;
    }

    (stages, access)
}

/// Pipeline stages and access mask of an acceleration structure usage.
pub fn acceleration_structure_stage_access(
    usage: AccelerationStructureUsage,
) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    let mut stages = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;

    if usage.contains(AccelerationStructureUsage::BUILD) {
        stages |= vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR;
        access |= vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR;
    }
    if usage.contains(AccelerationStructureUsage::ATTACH) {
        stages |= vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR;
        access |= vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR;
    }
    // Only MEMORY_READ is valid for ray queries from raster and compute stages.
    if usage.contains(AccelerationStructureUsage::GEOMETRY_READ) {
        stages |= GEOMETRY_STAGES;
        access |= vk::AccessFlags2::MEMORY_READ;
    }
    if usage.contains(AccelerationStructureUsage::FRAGMENT_READ) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
        access |= vk::AccessFlags2::MEMORY_READ;
    }
    if usage.contains(AccelerationStructureUsage::COMPUTE_READ) {
        stages |= vk::PipelineStageFlags2::COMPUTE_SHADER;
        access |= vk::AccessFlags2::MEMORY_READ;
    }
    if usage.contains(AccelerationStructureUsage::TRACE_RAYS_READ) {
        stages |= vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR;
        access |= vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR;
    }

    if stages.is_empty() {
        stages = vk::PipelineStageFlags2::TOP_OF_PIPE;
    }

    (stages, access)
}
