//! Descriptions of the resources a graph can address.
//!
//! New render targets are described by a [`RenderTargetDescription`]. Its [`content_hash()`](RenderTargetDescription::content_hash)
//! is the key into the render target cache and deliberately does not contain any usage bits: the usage of a new render target
//! is derived from the dependencies passes declare on it.

use std::hash::{Hash, Hasher};
use std::ops::Range;

use ash::vk;

use crate::graph::usage::TextureUsage;
use crate::util::hash::{hash_f32, hash_of};
use crate::util::to_vk::IntoVulkanType;

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    D1,
    #[default]
    D2,
    D3,
    D2Array,
    Cube,
    CubeArray,
}

impl TextureType {
    /// Number of faces per layer. Six for cube textures, one otherwise.
    pub fn face_count(&self) -> u32 {
        match self {
            TextureType::Cube | TextureType::CubeArray => 6,
            _ => 1,
        }
    }
}

impl IntoVulkanType for TextureType {
    type Output = vk::ImageType;

    fn into_vulkan(self) -> Self::Output {
        match self {
            TextureType::D1 => vk::ImageType::TYPE_1D,
            TextureType::D3 => vk::ImageType::TYPE_3D,
            _ => vk::ImageType::TYPE_2D,
        }
    }
}

/// Depth and stencil aspects implied by a format. Empty for color formats.
pub fn format_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::empty(),
    }
}

/// Full description of a backend texture, including the usages it must support.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub mip_count: u32,
    pub format: vk::Format,
    pub ty: TextureType,
    pub samples: u32,
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// Depth/stencil aspect of this texture's format.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        format_aspect(self.format)
    }

    /// Number of surfaces (mip, layer, face triples) of this texture.
    pub fn surface_count(&self) -> usize {
        (self.mip_count * self.layer_count * self.ty.face_count()) as usize
    }

    /// Subresource covering the entire texture.
    pub fn whole_subresource(&self) -> TextureSubresource {
        TextureSubresource {
            first_mip: 0,
            mip_count: self.mip_count,
            first_layer: 0,
            layer_count: self.layer_count,
            first_face: 0,
            face_count: self.ty.face_count(),
            aspect: self.aspect(),
        }
    }

    /// Width and height of a mip level.
    pub fn mip_extent(&self, mip: u32) -> vk::Extent2D {
        vk::Extent2D {
            width: (self.width >> mip).max(1),
            height: (self.height >> mip).max(1),
        }
    }
}

/// Description of a new render target, allocated by the graph from its cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDescription {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub layer_count: u32,
    pub mip_count: u32,
    pub format: vk::Format,
    pub ty: TextureType,
    pub samples: u32,
}

impl RenderTargetDescription {
    /// Describe a single-mip 2D render target.
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth: 1,
            layer_count: 1,
            mip_count: 1,
            format,
            ty: TextureType::D2,
            samples: 1,
        }
    }

    pub fn ty(mut self, ty: TextureType) -> Self {
        self.ty = ty;
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn layer_count(mut self, layers: u32) -> Self {
        self.layer_count = layers;
        self
    }

    pub fn mip_count(mut self, mips: u32) -> Self {
        self.mip_count = mips;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Cache key of this description. Includes the name and the shape, never usage bits.
    pub fn content_hash(&self) -> u64 {
        hash_of(self)
    }

    /// Turn this description into the info of a texture supporting `usage`.
    pub fn to_texture_info(&self, usage: TextureUsage) -> TextureInfo {
        TextureInfo {
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            depth: self.depth,
            layer_count: self.layer_count,
            mip_count: self.mip_count,
            format: self.format,
            ty: self.ty,
            samples: self.samples,
            usage,
        }
    }
}

impl Hash for RenderTargetDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.width.hash(state);
        self.height.hash(state);
        self.depth.hash(state);
        self.layer_count.hash(state);
        self.mip_count.hash(state);
        self.format.hash(state);
        self.ty.hash(state);
        self.samples.hash(state);
    }
}

/// A single surface of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureSurface {
    pub mip: u32,
    pub layer: u32,
    pub face: u32,
}

impl TextureSurface {
    pub fn new(mip: u32, layer: u32, face: u32) -> Self {
        Self {
            mip,
            layer,
            face,
        }
    }

    /// Flat index of this surface in a texture with the given number of layers and faces.
    pub fn index(&self, layer_count: u32, face_count: u32) -> usize {
        (face_count * layer_count * self.mip + face_count * self.layer + self.face) as usize
    }
}

/// A range of mips, layers and faces of a texture, plus the depth/stencil aspect being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresource {
    pub first_mip: u32,
    pub mip_count: u32,
    pub first_layer: u32,
    pub layer_count: u32,
    pub first_face: u32,
    pub face_count: u32,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for TextureSubresource {
    fn default() -> Self {
        Self::surface(TextureSurface::default())
    }
}

impl TextureSubresource {
    /// Subresource containing exactly one surface.
    pub fn surface(surface: TextureSurface) -> Self {
        Self {
            first_mip: surface.mip,
            mip_count: 1,
            first_layer: surface.layer,
            layer_count: 1,
            first_face: surface.face,
            face_count: 1,
            aspect: vk::ImageAspectFlags::empty(),
        }
    }

    /// All layers and faces of a range of mips. The layer and face counts are filled in when the dependency is declared.
    pub fn mips(first_mip: u32, mip_count: u32) -> Self {
        Self {
            first_mip,
            mip_count,
            first_layer: 0,
            layer_count: 0,
            first_face: 0,
            face_count: 0,
            aspect: vk::ImageAspectFlags::empty(),
        }
    }

    /// Set the depth/stencil aspect.
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    pub fn mip_range(&self) -> Range<u32> {
        self.first_mip..self.first_mip + self.mip_count
    }

    pub fn layer_range(&self) -> Range<u32> {
        self.first_layer..self.first_layer + self.layer_count
    }

    pub fn face_range(&self) -> Range<u32> {
        self.first_face..self.first_face + self.face_count
    }

    /// Two subresources overlap if they share at least one mip, one layer and one face.
    pub fn overlaps(&self, other: &Self) -> bool {
        fn ranges_overlap(a: Range<u32>, b: Range<u32>) -> bool {
            a.start < b.end && b.start < a.end
        }
        ranges_overlap(self.face_range(), other.face_range())
            && ranges_overlap(self.mip_range(), other.mip_range())
            && ranges_overlap(self.layer_range(), other.layer_range())
    }

    /// Iterate all surfaces, mips outermost and faces innermost.
    pub fn surfaces(&self) -> impl Iterator<Item = TextureSurface> + '_ {
        self.mip_range().flat_map(move |mip| {
            self.layer_range()
                .flat_map(move |layer| self.face_range().map(move |face| TextureSurface::new(mip, layer, face)))
        })
    }

    /// Fill in zero counts and the aspect from the texture shape, then check the range lies inside the texture.
    pub(crate) fn fixup(mut self, info: &TextureInfo) -> Self {
        if self.mip_count == 0 {
            self.first_mip = 0;
            self.mip_count = info.mip_count;
        }
        if self.layer_count == 0 {
            self.first_layer = 0;
            self.layer_count = info.layer_count;
        }
        if self.face_count == 0 {
            self.first_face = 0;
            self.face_count = info.ty.face_count();
        }
        if self.aspect.is_empty() {
            self.aspect = info.aspect();
        }
        assert!(
            self.mip_range().end <= info.mip_count
                && self.layer_range().end <= info.layer_count
                && self.face_range().end <= info.ty.face_count(),
            "subresource {self:?} out of range for texture `{}`",
            info.name
        );
        self
    }

    /// Convert to a Vulkan range. Cube faces are stored as array layers, so a face range that does not cover all
    /// faces can only span a single layer.
    pub fn to_vk_range(&self, faces_per_layer: u32) -> vk::ImageSubresourceRange {
        let aspect_mask = if self.aspect.is_empty() {
            vk::ImageAspectFlags::COLOR
        } else {
            self.aspect
        };
        let layer_count = if self.face_count == faces_per_layer {
            self.layer_count * faces_per_layer
        } else {
            debug_assert_eq!(self.layer_count, 1, "partial face ranges must cover a single layer");
            self.face_count
        };
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: self.first_mip,
            level_count: self.mip_count,
            base_array_layer: self.first_layer * faces_per_layer + self.first_face,
            layer_count,
        }
    }
}

/// Clear value of a render pass attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0; 4])
    }
}

impl Hash for ClearValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ClearValue::Color(color) => {
                state.write_u8(0);
                color.iter().for_each(|&c| hash_f32(c, state));
            }
            ClearValue::DepthStencil {
                depth,
                stencil,
            } => {
                state.write_u8(1);
                hash_f32(*depth, state);
                stencil.hash(state);
            }
        }
    }
}

impl IntoVulkanType for ClearValue {
    type Output = vk::ClearValue;

    fn into_vulkan(self) -> Self::Output {
        match self {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue {
                    float32,
                },
            },
            ClearValue::DepthStencil {
                depth,
                stencil,
            } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil,
                },
            },
        }
    }
}

/// Returns true if the byte ranges `[a_offset, a_offset + a_range)` and `[b_offset, b_offset + b_range)` overlap.
pub fn buffer_ranges_overlap(a_offset: u64, a_range: u64, b_offset: u64, b_range: u64) -> bool {
    a_offset < b_offset.saturating_add(b_range) && b_offset < a_offset.saturating_add(a_range)
}
