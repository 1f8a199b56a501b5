//! Physical device (GPU) selection.
//!
//! A device is suitable when it reports at least Vulkan 1.2, supports
//! `VK_KHR_swapchain`, exposes a universal (graphics + compute + transfer)
//! queue family and, when a surface is given, can present to it from at least
//! one family. Among suitable devices discrete GPUs win, then the one with the
//! most device-local memory.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::backend::{QueueCaps, QueueFamily};
use crate::error::{RhiError, RhiResult};
use crate::vulkan::instance::{Instance, MIN_API_VERSION};
use crate::vulkan::surface::Surface;

/// Device extensions every selected GPU must support.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Information about a selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Every queue family with its full hardware queue count.
    pub queue_families: Vec<QueueFamily>,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the best suitable GPU.
///
/// # Errors
///
/// Returns [`RhiError::Configuration`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<&Surface>,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.handle().enumerate_physical_devices()? };
    if devices.is_empty() {
        return Err(RhiError::Configuration(
            "no Vulkan-capable GPU found".to_string(),
        ));
    }
    info!("Found {} GPU(s)", devices.len());

    let mut suitable: Vec<(PhysicalDeviceInfo, u64)> = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .collect();

    if suitable.is_empty() {
        warn!("No GPU satisfies API 1.2, VK_KHR_swapchain and a universal queue family");
        return Err(RhiError::Configuration(
            "no GPU satisfies the minimum requirements".to_string(),
        ));
    }

    suitable.sort_by(|a, b| b.1.cmp(&a.1));
    let (selected, score) = suitable.swap_remove(0);

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.handle().get_physical_device_properties(device) };
    let memory_properties = unsafe {
        instance
            .handle()
            .get_physical_device_memory_properties(device)
    };
    let name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned()
    };

    if properties.api_version < MIN_API_VERSION {
        debug!(
            "GPU '{}' skipped: Vulkan {}.{} < 1.2",
            name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    if !supports_extensions(instance, device) {
        debug!("GPU '{}' skipped: missing VK_KHR_swapchain", name);
        return None;
    }

    let queue_families = find_queue_families(instance, device, surface);
    if !has_universal_family(&queue_families) {
        debug!("GPU '{}' skipped: no universal queue family", name);
        return None;
    }
    if surface.is_some() && !queue_families.iter().any(|f| f.caps.present) {
        debug!("GPU '{}' skipped: cannot present to the surface", name);
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_extensions(instance: &Instance, device: vk::PhysicalDevice) -> bool {
    let available = match unsafe {
        instance
            .handle()
            .enumerate_device_extension_properties(device)
    } {
        Ok(available) => available,
        Err(_) => return false,
    };

    DEVICE_EXTENSIONS.iter().all(|wanted| {
        available.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == *wanted
        })
    })
}

fn find_queue_families(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: Option<&Surface>,
) -> Vec<QueueFamily> {
    let properties = unsafe {
        instance
            .handle()
            .get_physical_device_queue_family_properties(device)
    };

    properties
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let index = i as u32;
            let present = surface.is_some_and(|surface| unsafe {
                instance
                    .surface_loader()
                    .get_physical_device_surface_support(device, index, surface.handle())
                    .unwrap_or(false)
            });
            QueueFamily {
                index,
                caps: QueueCaps::from_flags(family.queue_flags, present),
                queue_count: family.queue_count,
            }
        })
        .collect()
}

/// Returns true if some family can do graphics, compute and transfer.
pub fn has_universal_family(families: &[QueueFamily]) -> bool {
    families
        .iter()
        .any(|f| f.queue_count > 0 && f.caps.is_superset_of(&QueueCaps::UNIVERSAL))
}

fn rate_device(info: &PhysicalDeviceInfo) -> u64 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(16_000);
    let families = info.queue_families.len() as u64;

    type_score + vram_mb + families
}
