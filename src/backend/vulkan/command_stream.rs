//! Command streams of the Vulkan backend.
//!
//! Every stream records into a command buffer allocated from its own transient `VkCommandPool`, so streams can be
//! recorded on different threads without external synchronization. Pools are recycled through a [`CommandPoolRecycler`]
//! once the submission that used them has completed, or immediately if the stream is dropped without being submitted.

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::extensions::ext::DebugUtils;
use ash::vk;

use crate::backend::vulkan::framebuffer::VulkanFramebuffer;
use crate::backend::vulkan::query::VulkanTimestampQuery;
use crate::backend::vulkan::VulkanBackend;
use crate::backend::{CommandStream, CommandStreamLevel, RenderPassBeginInfo};
use crate::graph::barrier::{AccelerationStructureBarrier, BufferBarrier, TextureBarrier};
use crate::Error;

/// Free list of reset command pools.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct CommandPoolRecycler {
    #[derivative(Debug = "ignore")]
    device: Arc<ash::Device>,
    queue_family_index: u32,
    free: Mutex<Vec<vk::CommandPool>>,
}

impl CommandPoolRecycler {
    pub fn new(device: Arc<ash::Device>, queue_family_index: u32) -> Self {
        Self {
            device,
            queue_family_index,
            free: Mutex::new(vec![]),
        }
    }

    pub fn acquire(&self) -> Result<vk::CommandPool> {
        let recycled = self.free.lock().map_err(|_| anyhow::Error::from(Error::PoisonError))?.pop();
        if let Some(pool) = recycled {
            return Ok(pool);
        }
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(self.queue_family_index);
        let pool = unsafe { self.device.create_command_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {pool:p}");
        Ok(pool)
    }

    /// Reset `pool` and put it back on the free list. The GPU must be done with all its command buffers.
    pub fn release(&self, pool: vk::CommandPool) {
        if let Err(err) = unsafe { self.device.reset_command_pool(pool, vk::CommandPoolResetFlags::empty()) } {
            warn!("Failed to reset command pool, destroying it: {err}");
            self.destroy(pool);
            return;
        }
        match self.free.lock() {
            Ok(mut free) => free.push(pool),
            Err(_) => self.destroy(pool),
        }
    }

    fn destroy(&self, pool: vk::CommandPool) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {pool:p}");
        unsafe {
            self.device.destroy_command_pool(pool, None);
        }
    }
}

impl Drop for CommandPoolRecycler {
    fn drop(&mut self) {
        let pools = match self.free.get_mut() {
            Ok(free) => std::mem::take(free),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for pool in pools {
            self.destroy(pool);
        }
    }
}

/// A command buffer being recorded, plus the secondary streams it executes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanCommandStream {
    #[derivative(Debug = "ignore")]
    device: Arc<ash::Device>,
    #[derivative(Debug = "ignore")]
    debug_utils: Option<Arc<DebugUtils>>,
    #[derivative(Debug = "ignore")]
    recycler: Arc<CommandPoolRecycler>,
    pool: vk::CommandPool,
    handle: vk::CommandBuffer,
    level: CommandStreamLevel,
    /// Executed secondary streams, kept alive until this stream is submitted.
    secondaries: Vec<VulkanCommandStream>,
    finished: bool,
}

impl VulkanCommandStream {
    pub(crate) fn new(
        backend: &VulkanBackend,
        level: CommandStreamLevel,
        framebuffer: Option<&VulkanFramebuffer>,
    ) -> Result<Self> {
        let recycler = backend.command_pools.clone();
        let pool = recycler.acquire()?;
        let vk_level = match level {
            CommandStreamLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandStreamLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk_level)
            .command_buffer_count(1);
        // The pool goes back to the recycler through drop if anything below fails
        let mut stream = Self {
            device: backend.device.clone(),
            debug_utils: backend.debug_utils.clone(),
            recycler,
            pool,
            handle: vk::CommandBuffer::null(),
            level,
            secondaries: vec![],
            finished: false,
        };
        let buffers = unsafe { stream.device.allocate_command_buffers(&allocate_info)? };
        stream.handle = buffers
            .first()
            .copied()
            .ok_or_else(|| anyhow::Error::from(Error::Uncategorized("no command buffer allocated")))?;
        stream.begin(framebuffer)?;
        Ok(stream)
    }

    fn begin(&self, framebuffer: Option<&VulkanFramebuffer>) -> Result<()> {
        match self.level {
            CommandStreamLevel::Primary => {
                let begin_info =
                    vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                unsafe { self.device.begin_command_buffer(self.handle, &begin_info)? };
            }
            CommandStreamLevel::Secondary => {
                let color_formats = framebuffer.map(|fb| fb.color_formats()).unwrap_or_default();
                let (depth_format, stencil_format) = framebuffer
                    .map(|fb| fb.depth_stencil_formats())
                    .unwrap_or((vk::Format::UNDEFINED, vk::Format::UNDEFINED));
                let mut rendering = vk::CommandBufferInheritanceRenderingInfo::builder()
                    .color_attachment_formats(&color_formats)
                    .depth_attachment_format(depth_format)
                    .stencil_attachment_format(stencil_format)
                    .rasterization_samples(framebuffer.map_or(vk::SampleCountFlags::TYPE_1, |fb| fb.inner.samples));
                let mut flags = vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
                let inheritance = if framebuffer.is_some() {
                    flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
                    vk::CommandBufferInheritanceInfo::builder().push_next(&mut rendering)
                } else {
                    vk::CommandBufferInheritanceInfo::builder()
                };
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(flags)
                    .inheritance_info(&inheritance);
                unsafe { self.device.begin_command_buffer(self.handle, &begin_info)? };
            }
        }
        Ok(())
    }

    /// The command buffer to record into.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Take ownership of the pools of this stream and all its secondaries. They must be released once the GPU is done.
    pub(crate) fn take_pools(mut self, pools: &mut Vec<vk::CommandPool>) {
        for secondary in std::mem::take(&mut self.secondaries) {
            secondary.take_pools(pools);
        }
        pools.push(std::mem::replace(&mut self.pool, vk::CommandPool::null()));
    }
}

impl Drop for VulkanCommandStream {
    fn drop(&mut self) {
        if self.pool != vk::CommandPool::null() {
            self.recycler.release(self.pool);
        }
    }
}

impl CommandStream<VulkanBackend> for VulkanCommandStream {
    fn pipeline_barrier(
        &mut self,
        textures: &[TextureBarrier<'_, VulkanBackend>],
        buffers: &[BufferBarrier<'_, VulkanBackend>],
        acceleration_structures: &[AccelerationStructureBarrier<'_, VulkanBackend>],
    ) {
        let image_barriers = textures
            .iter()
            .map(|barrier| {
                vk::ImageMemoryBarrier2::builder()
                    .src_stage_mask(barrier.src_stage)
                    .src_access_mask(barrier.src_access)
                    .dst_stage_mask(barrier.dst_stage)
                    .dst_access_mask(barrier.dst_access)
                    .old_layout(barrier.old_layout)
                    .new_layout(barrier.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(barrier.texture.image())
                    .subresource_range(barrier.subresource.to_vk_range(barrier.faces_per_layer))
                    .build()
            })
            .collect::<Vec<_>>();
        let buffer_barriers = buffers
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier2::builder()
                    .src_stage_mask(barrier.src_stage)
                    .src_access_mask(barrier.src_access)
                    .dst_stage_mask(barrier.dst_stage)
                    .dst_access_mask(barrier.dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(barrier.buffer.handle())
                    .offset(barrier.offset)
                    .size(barrier.range)
                    .build()
            })
            .collect::<Vec<_>>();
        let memory_barriers = acceleration_structures
            .iter()
            .map(|barrier| {
                vk::MemoryBarrier2::builder()
                    .src_stage_mask(barrier.src_stage)
                    .src_access_mask(barrier.src_access)
                    .dst_stage_mask(barrier.dst_stage)
                    .dst_access_mask(barrier.dst_access)
                    .build()
            })
            .collect::<Vec<_>>();

        let dependency_info = vk::DependencyInfo::builder()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers)
            .memory_barriers(&memory_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.handle, &dependency_info);
        }
    }

    fn begin_render_pass(&mut self, framebuffer: &VulkanFramebuffer, info: &RenderPassBeginInfo) {
        let fb = &framebuffer.inner;
        let color_attachments = fb
            .color
            .iter()
            .zip(&info.color_layouts)
            .map(|(attachment, &layout)| attachment.rendering_info(layout))
            .collect::<Vec<_>>();
        let layout = info.depth_stencil_layout.unwrap_or(vk::ImageLayout::UNDEFINED);
        let depth = fb
            .depth_stencil
            .as_ref()
            .filter(|ds| ds.aspect.contains(vk::ImageAspectFlags::DEPTH))
            .map(|ds| ds.rendering_info(layout));
        let stencil = fb
            .depth_stencil
            .as_ref()
            .filter(|ds| ds.aspect.contains(vk::ImageAspectFlags::STENCIL))
            .map(|ds| ds.stencil_rendering_info(layout));

        let flags = if info.secondary_streams {
            vk::RenderingFlags::CONTENTS_SECONDARY_COMMAND_BUFFERS
        } else {
            vk::RenderingFlags::empty()
        };
        let mut rendering_info = vk::RenderingInfo::builder()
            .flags(flags)
            .render_area(info.render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = &depth {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = &stencil {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }
        unsafe {
            self.device.cmd_begin_rendering(self.handle, &rendering_info);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_rendering(self.handle);
        }
    }

    fn execute_secondary(&mut self, streams: Vec<VulkanCommandStream>) {
        if streams.is_empty() {
            return;
        }
        let handles = streams.iter().map(|stream| stream.handle).collect::<Vec<_>>();
        unsafe {
            self.device.cmd_execute_commands(self.handle, &handles);
        }
        self.secondaries.extend(streams);
    }

    fn write_timestamp(&mut self, query: &VulkanTimestampQuery) {
        unsafe {
            self.device.cmd_reset_query_pool(self.handle, query.pool(), 0, 1);
            self.device
                .cmd_write_timestamp2(self.handle, vk::PipelineStageFlags2::ALL_COMMANDS, query.pool(), 0);
        }
    }

    fn begin_label(&mut self, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let name = CString::new(name).unwrap_or_default();
        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(&name)
            .color([1.0, 1.0, 1.0, 1.0]);
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(self.handle, &label);
        }
    }

    fn end_label(&mut self) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.handle);
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        unsafe { self.device.end_command_buffer(self.handle)? };
        self.finished = true;
        Ok(())
    }
}
