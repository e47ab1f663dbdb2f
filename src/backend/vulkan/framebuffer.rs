//! Framebuffers of the Vulkan backend.
//!
//! Render passes use dynamic rendering, so a framebuffer is simply the set of attachment views of a graphics pass along
//! with their load and store operations. Views are created per attached surface and destroyed together with the
//! framebuffer when the framebuffer cache evicts it.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::backend::vulkan::resource::{sample_count, VulkanTexture};
use crate::backend::{BackendTexture, FramebufferAttachment, FramebufferCreateInfo};
use crate::graph::resource::ClearValue;
use crate::util::to_vk::IntoVulkanType;

use super::VulkanBackend;

#[derive(Debug)]
pub(crate) struct AttachmentView {
    /// Keeps the attached image alive as long as the framebuffer.
    pub texture: VulkanTexture,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub clear_value: ClearValue,
}

impl AttachmentView {
    fn new(device: &ash::Device, attachment: &FramebufferAttachment<'_, VulkanBackend>) -> Result<Self> {
        let info = attachment.texture.info();
        let range = attachment.subresource.to_vk_range(info.ty.face_count());
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(attachment.texture.image())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(range);
        let view = unsafe { device.create_image_view(&create_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {view:p} for attachment `{}`", info.name);
        Ok(Self {
            texture: attachment.texture.clone(),
            view,
            format: info.format,
            aspect: info.aspect(),
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            stencil_load_op: attachment.stencil_load_op,
            stencil_store_op: attachment.stencil_store_op,
            clear_value: attachment.clear_value,
        })
    }

    pub fn rendering_info(&self, layout: vk::ImageLayout) -> vk::RenderingAttachmentInfo {
        vk::RenderingAttachmentInfo::builder()
            .image_view(self.view)
            .image_layout(layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(self.clear_value.into_vulkan())
            .build()
    }

    pub fn stencil_rendering_info(&self, layout: vk::ImageLayout) -> vk::RenderingAttachmentInfo {
        vk::RenderingAttachmentInfo::builder()
            .image_view(self.view)
            .image_layout(layout)
            .load_op(self.stencil_load_op)
            .store_op(self.stencil_store_op)
            .clear_value(self.clear_value.into_vulkan())
            .build()
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct FramebufferInner {
    #[derivative(Debug = "ignore")]
    device: Arc<ash::Device>,
    pub name: String,
    pub color: Vec<AttachmentView>,
    pub depth_stencil: Option<AttachmentView>,
    pub samples: vk::SampleCountFlags,
}

/// Attachment views of one graphics pass. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VulkanFramebuffer {
    pub(crate) inner: Arc<FramebufferInner>,
}

impl VulkanFramebuffer {
    pub(crate) fn new(device: Arc<ash::Device>, info: &FramebufferCreateInfo<'_, VulkanBackend>) -> Result<Self> {
        let mut inner = FramebufferInner {
            device: device.clone(),
            name: info.name.to_owned(),
            color: Vec::with_capacity(info.color_attachments.len()),
            depth_stencil: None,
            samples: vk::SampleCountFlags::TYPE_1,
        };
        // Views created so far are destroyed by `inner`'s drop if a later one fails
        for attachment in &info.color_attachments {
            inner.color.push(AttachmentView::new(&device, attachment)?);
        }
        if let Some(attachment) = &info.depth_stencil_attachment {
            inner.depth_stencil = Some(AttachmentView::new(&device, attachment)?);
        }
        inner.samples = info
            .color_attachments
            .iter()
            .chain(info.depth_stencil_attachment.iter())
            .map(|attachment| sample_count(attachment.texture.info().samples))
            .next()
            .unwrap_or(vk::SampleCountFlags::TYPE_1);
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn color_formats(&self) -> Vec<vk::Format> {
        self.inner.color.iter().map(|attachment| attachment.format).collect()
    }

    pub(crate) fn depth_stencil_formats(&self) -> (vk::Format, vk::Format) {
        match &self.inner.depth_stencil {
            None => (vk::Format::UNDEFINED, vk::Format::UNDEFINED),
            Some(ds) => {
                let depth = ds.aspect.contains(vk::ImageAspectFlags::DEPTH);
                let stencil = ds.aspect.contains(vk::ImageAspectFlags::STENCIL);
                (
                    if depth { ds.format } else { vk::Format::UNDEFINED },
                    if stencil { ds.format } else { vk::Format::UNDEFINED },
                )
            }
        }
    }
}

impl Drop for FramebufferInner {
    fn drop(&mut self) {
        for attachment in self.color.iter().chain(self.depth_stencil.iter()) {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkImageView {:p} of framebuffer `{}`", attachment.view, self.name);
            unsafe {
                self.device.destroy_image_view(attachment.view, None);
            }
        }
    }
}
