//! Vulkan implementation of [`Backend`].
//!
//! Bring-up order is instance, surface, physical device, logical device:
//!
//! ```no_run
//! # use frameflow_rhi::vulkan::{Device, Instance, VulkanBackend, select_physical_device};
//! # fn example() -> frameflow_rhi::RhiResult<()> {
//! let instance = Instance::new(cfg!(debug_assertions))?;
//! let physical = select_physical_device(&instance, None)?;
//! let device = Device::new(&instance, &physical, 4)?;
//! let backend = VulkanBackend::new(device);
//! # Ok(())
//! # }
//! ```

mod buffer;
mod command;
mod device;
mod instance;
mod physical_device;
mod shader;
mod surface;
mod swapchain;
mod sync;

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::backend::{
    AcquireStatus, Backend, BufferUsage, PresentStatus, QueueFamily, Submission,
};
use crate::error::{RhiError, RhiResult};
use crate::swapchain::{SwapchainDesc, SwapchainSupportDetails};

pub use buffer::Buffer;
pub use command::{CommandBuffer, CommandPool, color_subresource_range};
pub use device::Device;
pub use instance::{Instance, MIN_API_VERSION};
pub use physical_device::{
    DEVICE_EXTENSIONS, PhysicalDeviceInfo, has_universal_family, select_physical_device,
};
pub use shader::ShaderModule;
pub use surface::Surface;
pub use swapchain::{SWAPCHAIN_IMAGE_USAGE, VulkanSwapchain};
pub use sync::{Fence, Semaphore};

/// A native queue together with where it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceQueue {
    pub handle: vk::Queue,
    pub family: u32,
    pub index: u32,
}

/// [`Backend`] over a Vulkan logical device.
#[derive(Clone)]
pub struct VulkanBackend {
    device: Arc<Device>,
}

impl VulkanBackend {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Backend for VulkanBackend {
    type Queue = DeviceQueue;
    type CommandPool = CommandPool;
    type CommandBuffer = CommandBuffer;
    type Semaphore = Semaphore;
    type Fence = Fence;
    type Surface = Surface;
    type Swapchain = VulkanSwapchain;
    type Buffer = Buffer;
    type ShaderModule = ShaderModule;

    fn queue_families(&self) -> &[QueueFamily] {
        self.device.queue_families()
    }

    fn get_queue(&self, family: u32, index: u32) -> RhiResult<DeviceQueue> {
        let known = self
            .device
            .queue_families()
            .iter()
            .any(|f| f.index == family && index < f.queue_count);
        if !known {
            return Err(RhiError::InvalidHandle(format!(
                "Queue {} of family {} was not created",
                index, family
            )));
        }
        let handle = unsafe { self.device.handle().get_device_queue(family, index) };
        Ok(DeviceQueue {
            handle,
            family,
            index,
        })
    }

    fn queue_wait_idle(&self, queue: &DeviceQueue) -> RhiResult<()> {
        unsafe { self.device.handle().queue_wait_idle(queue.handle)? };
        Ok(())
    }

    fn create_command_pool(&self, family: u32) -> RhiResult<CommandPool> {
        CommandPool::new(self.device.clone(), family)
    }

    fn allocate_command_buffer(&self, pool: &CommandPool) -> RhiResult<CommandBuffer> {
        pool.allocate()
    }

    fn begin_commands(&self, commands: &CommandBuffer) -> RhiResult<()> {
        commands.reset()?;
        commands.begin()
    }

    fn end_commands(&self, commands: &CommandBuffer) -> RhiResult<()> {
        commands.end()
    }

    fn create_semaphore(&self) -> RhiResult<Semaphore> {
        Semaphore::new(self.device.clone())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<Fence> {
        Fence::new(self.device.clone(), signaled)
    }

    fn wait_fence(&self, fence: &Fence, timeout_ns: u64) -> RhiResult<()> {
        fence.wait(timeout_ns)
    }

    fn reset_fence(&self, fence: &Fence) -> RhiResult<()> {
        fence.reset()
    }

    fn submit(
        &self,
        queue: &DeviceQueue,
        submission: &Submission<'_, Self>,
        fence: Option<&Fence>,
    ) -> RhiResult<()> {
        let command_buffers: Vec<vk::CommandBuffer> =
            submission.commands.iter().map(|c| c.handle()).collect();
        let wait_semaphores: Vec<vk::Semaphore> =
            submission.wait.iter().map(|(s, _)| s.handle()).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submission.wait.iter().map(|(_, stage)| *stage).collect();
        let signal_semaphores: Vec<vk::Semaphore> =
            submission.signal.iter().map(|s| s.handle()).collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = fence.map_or(vk::Fence::null(), Fence::handle);
        unsafe {
            self.device
                .handle()
                .queue_submit(queue.handle, &[submit_info], fence)?;
        }
        trace!(
            "Submitted {} command buffer(s) to queue {}:{}",
            command_buffers.len(),
            queue.family,
            queue.index
        );
        Ok(())
    }

    fn surface_support(&self, surface: &Surface) -> RhiResult<SwapchainSupportDetails> {
        let loader = self.device.instance().surface_loader();
        let physical_device = self.device.physical_device();
        unsafe {
            Ok(SwapchainSupportDetails {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface.handle())?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface.handle())?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface.handle())?,
            })
        }
    }

    fn create_swapchain(
        &self,
        queue: &DeviceQueue,
        surface: &Surface,
        desc: &SwapchainDesc,
    ) -> RhiResult<VulkanSwapchain> {
        VulkanSwapchain::new(self.device.clone(), queue.handle, queue.family, surface, desc)
    }

    fn acquire_next_image(
        &self,
        swapchain: &VulkanSwapchain,
        signal: &Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireStatus> {
        let result = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                swapchain.handle(),
                timeout_ns,
                signal.handle(),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => Ok(AcquireStatus::Ready(index)),
            Ok((index, true)) => Ok(AcquireStatus::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireStatus::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn present(
        &self,
        queue: &DeviceQueue,
        swapchain: &VulkanSwapchain,
        image_index: u32,
        wait: &Semaphore,
    ) -> RhiResult<PresentStatus> {
        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let wait_semaphores = [wait.handle()];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(queue.handle, &present_info)
        };
        match result {
            Ok(false) => Ok(PresentStatus::Ok),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RhiResult<Buffer> {
        Buffer::new(self.device.clone(), usage, size)
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> RhiResult<()> {
        buffer.write_data(offset, data)
    }

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<ShaderModule> {
        ShaderModule::new(self.device.clone(), code)
    }
}
