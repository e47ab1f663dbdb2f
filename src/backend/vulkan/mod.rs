//! Vulkan implementation of the [`Backend`] trait, built on `ash` and `gpu-allocator`.
//!
//! The backend wraps a device created by the application and records into a single queue. It requires Vulkan 1.3 (or
//! the `synchronization2` and `dynamic_rendering` extensions promoted into it): barriers are recorded with
//! `vkCmdPipelineBarrier2` and render passes use dynamic rendering.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use framegraph::prelude::*;
//!
//! let backend = Arc::new(VulkanBackend::new(&entry, &instance, device, physical_device, queue_family_index)?);
//! // Swapchain images are owned by the swapchain, the graph only borrows them for a frame.
//! let info = TextureInfo { name: "swapchain".into(), usage: TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE | TextureUsage::PRESENT, ..info };
//! let swapchain = backend.import_texture(image, view, info);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::extensions::ext::DebugUtils;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;

use crate::backend::vulkan::command_stream::CommandPoolRecycler;
use crate::backend::vulkan::query::TimestampConverter;
use crate::backend::{Backend, CommandStreamInfo, FramebufferCreateInfo};
use crate::graph::resource::TextureInfo;
use crate::Error;

pub mod command_stream;
pub mod framebuffer;
pub mod query;
pub mod resource;

pub use command_stream::VulkanCommandStream;
pub use framebuffer::VulkanFramebuffer;
pub use query::VulkanTimestampQuery;
pub use resource::{VulkanAccelerationStructure, VulkanBuffer, VulkanTexture};

#[derive(Debug)]
struct InFlightSubmission {
    fence: vk::Fence,
    /// Fences created by the backend for submissions without a user fence.
    owned_fence: bool,
    pools: Vec<vk::CommandPool>,
}

/// Render graph backend for an existing Vulkan device.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanBackend {
    #[derivative(Debug = "ignore")]
    pub(crate) device: Arc<ash::Device>,
    #[derivative(Debug = "ignore")]
    pub(crate) debug_utils: Option<Arc<DebugUtils>>,
    #[derivative(Debug = "ignore")]
    allocator: resource::SharedAllocator,
    pub(crate) command_pools: Arc<CommandPoolRecycler>,
    queue: Mutex<vk::Queue>,
    in_flight: Mutex<Vec<InFlightSubmission>>,
    timestamps: TimestampConverter,
    next_uuid: AtomicU64,
}

impl VulkanBackend {
    /// Create a backend recording into queue 0 of `queue_family_index`.
    /// # Errors
    /// - Fails if the allocator could not be created.
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<Self> {
        let allocator = vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        })
        .map_err(Error::from)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let valid_bits = families
            .get(queue_family_index as usize)
            .map(|family| family.timestamp_valid_bits)
            .ok_or_else(|| anyhow::Error::from(Error::Uncategorized("invalid queue family index")))?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let debug_utils = if cfg!(feature = "debug-markers") {
            Some(Arc::new(DebugUtils::new(entry, instance)))
        } else {
            None
        };

        let device = Arc::new(device);
        info!(
            "Created Vulkan render graph backend on queue family {queue_family_index} (timestamp period {} ns)",
            properties.limits.timestamp_period
        );
        Ok(Self {
            command_pools: Arc::new(CommandPoolRecycler::new(device.clone(), queue_family_index)),
            device,
            debug_utils,
            allocator: Arc::new(Mutex::new(allocator)),
            queue: Mutex::new(queue),
            in_flight: Mutex::new(vec![]),
            timestamps: TimestampConverter {
                period: properties.limits.timestamp_period,
                valid_bits,
            },
            next_uuid: AtomicU64::new(1),
        })
    }

    fn next_uuid(&self) -> u64 {
        self.next_uuid.fetch_add(1, Ordering::Relaxed)
    }

    /// Wrap an image owned by the application, such as a swapchain image. The backend never destroys it.
    pub fn import_texture(&self, image: vk::Image, view: vk::ImageView, info: TextureInfo) -> VulkanTexture {
        VulkanTexture::import(self.device.clone(), image, view, info, self.next_uuid())
    }

    /// Wrap a buffer owned by the application.
    pub fn import_buffer(&self, buffer: vk::Buffer, size: u64) -> VulkanBuffer {
        VulkanBuffer::import(buffer, size, self.next_uuid())
    }

    /// Wrap an acceleration structure owned by the application.
    pub fn import_acceleration_structure(&self, handle: vk::AccelerationStructureKHR) -> VulkanAccelerationStructure {
        VulkanAccelerationStructure::import(handle, self.next_uuid())
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Recycle the command pools of every submission whose fence has signaled.
    fn collect_finished(&self) -> Result<()> {
        let mut in_flight = self.in_flight.lock().map_err(|_| anyhow::Error::from(Error::PoisonError))?;
        let mut index = 0;
        while index < in_flight.len() {
            let signaled = unsafe { self.device.get_fence_status(in_flight[index].fence)? };
            if signaled {
                let submission = in_flight.swap_remove(index);
                self.retire(submission);
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    fn retire(&self, submission: InFlightSubmission) {
        for pool in submission.pools {
            self.command_pools.release(pool);
        }
        if submission.owned_fence {
            unsafe { self.device.destroy_fence(submission.fence, None) };
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let submissions = match self.in_flight.get_mut() {
            Ok(in_flight) => std::mem::take(in_flight),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for submission in submissions {
            if let Err(err) = unsafe { self.device.wait_for_fences(&[submission.fence], true, u64::MAX) } {
                error!("Failed to wait for in-flight submission: {err}");
            }
            self.retire(submission);
        }
    }
}

impl Backend for VulkanBackend {
    type Texture = VulkanTexture;
    type Buffer = VulkanBuffer;
    type AccelerationStructure = VulkanAccelerationStructure;
    type Framebuffer = VulkanFramebuffer;
    type CommandStream = VulkanCommandStream;
    type Fence = vk::Fence;
    type TimestampQuery = VulkanTimestampQuery;

    fn create_texture(&self, info: &TextureInfo) -> Result<VulkanTexture> {
        VulkanTexture::allocate(self.device.clone(), self.allocator.clone(), info, self.next_uuid())
    }

    fn create_framebuffer(&self, info: &FramebufferCreateInfo<'_, Self>) -> Result<VulkanFramebuffer> {
        VulkanFramebuffer::new(self.device.clone(), info)
    }

    fn new_command_stream(&self, info: &CommandStreamInfo<'_, Self>) -> Result<VulkanCommandStream> {
        let stream = VulkanCommandStream::new(self, info.level, info.framebuffer)?;
        if let Some(debug_utils) = &self.debug_utils {
            if let Ok(name) = std::ffi::CString::new(info.name) {
                let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
                    .object_type(vk::ObjectType::COMMAND_BUFFER)
                    .object_handle(vk::Handle::as_raw(stream.handle()))
                    .object_name(&name);
                if let Err(err) = unsafe { debug_utils.set_debug_utils_object_name(self.device.handle(), &name_info) } {
                    warn!("Failed to name command stream `{}`: {err}", info.name);
                }
            }
        }
        Ok(stream)
    }

    fn submit(&self, streams: Vec<VulkanCommandStream>, fence: Option<&vk::Fence>) -> Result<()> {
        self.collect_finished()?;

        let (fence, owned_fence) = match fence {
            Some(fence) => (*fence, false),
            None => (unsafe { self.device.create_fence(&vk::FenceCreateInfo::default(), None)? }, true),
        };
        let handles = streams.iter().map(|stream| stream.handle()).collect::<Vec<_>>();
        let submit = vk::SubmitInfo::builder().command_buffers(&handles).build();
        let result = {
            let queue = self.queue.lock().map_err(|_| anyhow::Error::from(Error::PoisonError))?;
            unsafe { self.device.queue_submit(*queue, std::slice::from_ref(&submit), fence) }
        };
        if let Err(err) = result {
            if owned_fence {
                unsafe { self.device.destroy_fence(fence, None) };
            }
            return Err(err.into());
        }

        let mut pools = vec![];
        for stream in streams {
            stream.take_pools(&mut pools);
        }
        trace!("Submitted {} command streams", handles.len());
        self.in_flight
            .lock()
            .map_err(|_| anyhow::Error::from(Error::PoisonError))?
            .push(InFlightSubmission {
                fence,
                owned_fence,
                pools,
            });
        Ok(())
    }

    fn new_timestamp_query(&self) -> Result<VulkanTimestampQuery> {
        VulkanTimestampQuery::new(self.device.clone())
    }

    fn read_timestamp(&self, query: &VulkanTimestampQuery) -> Result<Option<u64>> {
        Ok(query.read_ticks()?.map(|ticks| self.timestamps.nanoseconds(ticks)))
    }
}
