//! Textures, buffers and acceleration structures of the Vulkan backend.
//!
//! Render targets are allocated by the backend through `gpu-allocator` and own their image, default view and memory.
//! Everything else enters the graph through the `import_*` functions of [`VulkanBackend`](super::VulkanBackend), which
//! wrap handles owned by the application without taking ownership.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;
use gpu_allocator::MemoryLocation;

use crate::backend::{BackendBuffer, BackendObject, BackendTexture};
use crate::graph::resource::{TextureInfo, TextureType};
use crate::graph::usage::TextureUsage;
use crate::util::to_vk::IntoVulkanType;
use crate::Error;

pub(crate) type SharedAllocator = Arc<Mutex<vk_alloc::Allocator>>;

/// Image usage flags a texture needs to support every usage in `usage`.
pub fn image_usage(usage: TextureUsage, aspect: vk::ImageAspectFlags) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.intersects(TextureUsage::ALL_SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.intersects(TextureUsage::ALL_IMAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.intersects(TextureUsage::ALL_FRAMEBUFFER) {
        flags |= if aspect.is_empty() {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        } else {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        };
    }
    if usage.contains(TextureUsage::FRAMEBUFFER_ATTACHMENT_READ) {
        flags |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }
    if usage.contains(TextureUsage::FRAMEBUFFER_SHADING_RATE) {
        flags |= vk::ImageUsageFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
    }
    if usage.contains(TextureUsage::TRANSFER_DESTINATION) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::GENERATE_MIPMAPS) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

fn view_type(info: &TextureInfo) -> vk::ImageViewType {
    match info.ty {
        TextureType::D1 => vk::ImageViewType::TYPE_1D,
        TextureType::D2 if info.layer_count > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::D2 => vk::ImageViewType::TYPE_2D,
        TextureType::D3 => vk::ImageViewType::TYPE_3D,
        TextureType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureType::Cube => vk::ImageViewType::CUBE,
        TextureType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

/// Aspect of views used for sampling. Depth wins over stencil for combined formats.
pub(crate) fn view_aspect(aspect: vk::ImageAspectFlags) -> vk::ImageAspectFlags {
    if aspect.is_empty() {
        vk::ImageAspectFlags::COLOR
    } else if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    }
}

pub(crate) fn sample_count(samples: u32) -> vk::SampleCountFlags {
    vk::SampleCountFlags::from_raw(samples.max(1))
}

#[derive(Derivative)]
#[derivative(Debug)]
struct TextureInner {
    #[derivative(Debug = "ignore")]
    device: Arc<ash::Device>,
    #[derivative(Debug = "ignore")]
    allocator: Option<SharedAllocator>,
    image: vk::Image,
    view: vk::ImageView,
    #[derivative(Debug = "ignore")]
    memory: Option<vk_alloc::Allocation>,
    /// Owned textures destroy their image and view on drop.
    owned: bool,
    info: TextureInfo,
    uuid: u64,
}

unsafe impl Send for TextureInner {}

unsafe impl Sync for TextureInner {}

/// A Vulkan image together with a view of all its subresources. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VulkanTexture {
    inner: Arc<TextureInner>,
}

impl VulkanTexture {
    pub(crate) fn allocate(
        device: Arc<ash::Device>,
        allocator: SharedAllocator,
        info: &TextureInfo,
        uuid: u64,
    ) -> Result<Self> {
        let aspect = info.aspect();
        let flags = if info.ty.face_count() == 6 {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(info.ty.into_vulkan())
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: info.depth,
            })
            .mip_levels(info.mip_count)
            .array_layers(info.layer_count * info.ty.face_count())
            .samples(sample_count(info.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage(info.usage, aspect))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.create_image(&create_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {image:p} for `{}`", info.name);

        let memory = match Self::bind_memory(&device, &allocator, image, &info.name) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };
        let view = match create_view(&device, image, info) {
            Ok(view) => view,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                free_allocation(&allocator, memory);
                return Err(err);
            }
        };

        Ok(Self {
            inner: Arc::new(TextureInner {
                device,
                allocator: Some(allocator),
                image,
                view,
                memory: Some(memory),
                owned: true,
                info: info.clone(),
                uuid,
            }),
        })
    }

    fn bind_memory(
        device: &ash::Device,
        allocator: &SharedAllocator,
        image: vk::Image,
        name: &str,
    ) -> Result<vk_alloc::Allocation> {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = {
            let mut allocator = allocator.lock().map_err(|_| anyhow::Error::from(Error::PoisonError))?;
            allocator
                .allocate(&vk_alloc::AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(Error::from)?
        };
        if let Err(err) = unsafe { device.bind_image_memory(image, memory.memory(), memory.offset()) } {
            free_allocation(allocator, memory);
            return Err(err.into());
        }
        Ok(memory)
    }

    pub(crate) fn import(device: Arc<ash::Device>, image: vk::Image, view: vk::ImageView, info: TextureInfo, uuid: u64) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                device,
                allocator: None,
                image,
                view,
                memory: None,
                owned: false,
                info,
                uuid,
            }),
        }
    }

    /// The underlying image handle.
    pub fn image(&self) -> vk::Image {
        self.inner.image
    }

    /// View of all subresources.
    pub fn view(&self) -> vk::ImageView {
        self.inner.view
    }

    /// Whether the image is owned by the backend rather than the application.
    pub fn is_owned(&self) -> bool {
        self.inner.owned
    }
}

pub(crate) fn create_view(device: &ash::Device, image: vk::Image, info: &TextureInfo) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(view_type(info))
        .format(info.format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: view_aspect(info.aspect()),
            base_mip_level: 0,
            level_count: info.mip_count,
            base_array_layer: 0,
            layer_count: info.layer_count * info.ty.face_count(),
        });
    let view = unsafe { device.create_image_view(&create_info, None)? };
    #[cfg(feature = "log-objects")]
    trace!("Created new VkImageView {view:p}");
    Ok(view)
}

fn free_allocation(allocator: &SharedAllocator, memory: vk_alloc::Allocation) {
    match allocator.lock() {
        Ok(mut allocator) => {
            if let Err(err) = allocator.free(memory) {
                error!("Failed to free texture memory: {err}");
            }
        }
        Err(_) => error!("Failed to free texture memory: allocator mutex poisoned"),
    }
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImage {:p} of `{}`", self.image, self.info.name);
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
        }
        if let (Some(allocator), Some(memory)) = (&self.allocator, self.memory.take()) {
            free_allocation(allocator, memory);
        }
    }
}

impl BackendObject for VulkanTexture {
    fn uuid(&self) -> u64 {
        self.inner.uuid
    }
}

impl BackendTexture for VulkanTexture {
    fn info(&self) -> &TextureInfo {
        &self.inner.info
    }
}

/// An application-owned buffer, imported into the graph.
#[derive(Debug, Clone)]
pub struct VulkanBuffer {
    handle: vk::Buffer,
    size: u64,
    uuid: u64,
}

impl VulkanBuffer {
    pub(crate) fn import(handle: vk::Buffer, size: u64, uuid: u64) -> Self {
        Self {
            handle,
            size,
            uuid,
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

impl BackendObject for VulkanBuffer {
    fn uuid(&self) -> u64 {
        self.uuid
    }
}

impl BackendBuffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }
}

/// An application-owned acceleration structure, imported into the graph.
#[derive(Debug, Clone)]
pub struct VulkanAccelerationStructure {
    handle: vk::AccelerationStructureKHR,
    uuid: u64,
}

impl VulkanAccelerationStructure {
    pub(crate) fn import(handle: vk::AccelerationStructureKHR, uuid: u64) -> Self {
        Self {
            handle,
            uuid,
        }
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }
}

impl BackendObject for VulkanAccelerationStructure {
    fn uuid(&self) -> u64 {
        self.uuid
    }
}
