//! Vulkan swapchain built from a [`SwapchainDesc`].
//!
//! Sharing mode is always EXCLUSIVE: the frame loop renders and presents from
//! the same queue. Images are created with COLOR_ATTACHMENT and TRANSFER_DST
//! usage and are transitioned to PRESENT_SRC before the swapchain is returned,
//! so the first acquire sees images in a presentable layout.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::backend::SwapchainImages;
use crate::error::RhiResult;
use crate::swapchain::SwapchainDesc;
use crate::vulkan::command::CommandPool;
use crate::vulkan::device::Device;
use crate::vulkan::surface::Surface;
use crate::vulkan::sync::Fence;

/// Usage flags every swapchain image gets.
pub const SWAPCHAIN_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Vulkan swapchain wrapper.
///
/// # Thread Safety
///
/// Acquire and present go through the owning queue, which the caller holds
/// exclusively. The wrapper itself is immutable after creation.
pub struct VulkanSwapchain {
    device: Arc<Device>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    desc: SwapchainDesc,
}

impl VulkanSwapchain {
    /// Creates the swapchain, its image views, and moves every image to
    /// PRESENT_SRC_KHR using a one-shot command buffer on `queue`.
    pub fn new(
        device: Arc<Device>,
        queue: vk::Queue,
        queue_family_index: u32,
        surface: &Surface,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self> {
        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.present_mode,
            desc.min_image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(desc.min_image_count)
            .image_format(desc.format)
            .image_color_space(desc.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(SWAPCHAIN_IMAGE_USAGE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(desc.clipped)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        // From here on, Drop cleans up whatever was created.
        let mut this = Self {
            device,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            desc: *desc,
        };

        this.images = unsafe { this.device.swapchain_loader().get_swapchain_images(swapchain)? };
        info!("Swapchain created with {} images", this.images.len());

        for &image in &this.images {
            let view = create_image_view(&this.device, image, desc.format)?;
            this.image_views.push(view);
        }

        this.transition_to_present(queue, queue_family_index)?;
        Ok(this)
    }

    fn transition_to_present(&self, queue: vk::Queue, queue_family_index: u32) -> RhiResult<()> {
        let pool = CommandPool::new_transient(self.device.clone(), queue_family_index)?;
        let commands = pool.allocate()?;
        let fence = Fence::new(self.device.clone(), false)?;

        commands.begin()?;
        for &image in &self.images {
            commands.transition_color_image(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::PRESENT_SRC_KHR,
                (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
                (
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::AccessFlags::MEMORY_READ,
                ),
            );
        }
        commands.end()?;

        let command_buffers = [commands.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .handle()
                .queue_submit(queue, &[submit_info], fence.handle())?;
        }
        fence.wait(u64::MAX)?;

        debug!(
            "Transitioned {} swapchain images to PRESENT_SRC_KHR",
            self.images.len()
        );
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn desc(&self) -> &SwapchainDesc {
        &self.desc
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.image_views[index as usize]
    }
}

impl SwapchainImages for VulkanSwapchain {
    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    fn format(&self) -> vk::Format {
        self.desc.format
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.desc.extent.width,
            self.desc.extent.height,
            self.images.len()
        );
    }
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(crate::vulkan::command::color_subresource_range());
    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_usage_includes_color_attachment() {
        assert!(SWAPCHAIN_IMAGE_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(SWAPCHAIN_IMAGE_USAGE.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }
}
