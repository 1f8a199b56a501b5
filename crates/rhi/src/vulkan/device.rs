//! Vulkan logical device.
//!
//! The device requests up to `queues_per_family` queues from every queue
//! family so that the engine's queue registry has real hardware queues to hand
//! out. Memory for host-visible buffers comes from gpu-allocator.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, info};

use crate::backend::QueueFamily;
use crate::error::RhiResult;
use crate::vulkan::instance::Instance;
use crate::vulkan::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo};

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across threads through `Arc`. The allocator is behind a `Mutex`;
/// queue access is synchronized by the caller.
pub struct Device {
    instance: Arc<Instance>,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    swapchain_loader: ash::khr::swapchain::Device,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Families with the number of queues actually created.
    queue_families: Vec<QueueFamily>,
}

impl Device {
    /// Creates the logical device and its allocator.
    ///
    /// Families that report zero queues are skipped. Every other family gets
    /// `min(queue_count, queues_per_family)` queues at equal priority.
    pub fn new(
        instance: &Arc<Instance>,
        physical_device_info: &PhysicalDeviceInfo,
        queues_per_family: u32,
    ) -> RhiResult<Arc<Self>> {
        let queue_families: Vec<QueueFamily> = physical_device_info
            .queue_families
            .iter()
            .filter(|f| f.queue_count > 0)
            .map(|f| QueueFamily {
                queue_count: f.queue_count.min(queues_per_family.max(1)),
                ..*f
            })
            .collect();

        let priorities: Vec<Vec<f32>> = queue_families
            .iter()
            .map(|f| vec![1.0; f.queue_count as usize])
            .collect();

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .iter()
            .zip(&priorities)
            .map(|(family, priorities)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family.index)
                    .queue_priorities(priorities)
            })
            .collect();

        for family in &queue_families {
            debug!(
                "Requesting {} queue(s) from family {} ({:?})",
                family.queue_count, family.index, family.caps
            );
        }

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };
        info!(
            "Logical device created with {} queue family(ies)",
            queue_families.len()
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            instance: instance.clone(),
            device,
            physical_device: physical_device_info.device,
            swapchain_loader,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue_families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn queue_families(&self) -> &[QueueFamily] {
        &self.queue_families
    }

    /// Locks the GPU memory allocator.
    ///
    /// A poisoned lock is recovered: the allocator's own state is consistent
    /// between calls.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for all queues to become idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator owns device memory and must go before the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is a function table plus handle, the allocator is behind a
// Mutex, and the remaining fields are plain handles or immutable data.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
