//! Presentation surface.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::vulkan::instance::Instance;

/// RAII wrapper around a `VkSurfaceKHR`.
///
/// The surface keeps its instance alive. It must be dropped before the native
/// window it was created from.
pub struct Surface {
    instance: Arc<Instance>,
    handle: vk::SurfaceKHR,
}

impl Surface {
    /// Creates a surface for a native window.
    ///
    /// # Safety
    ///
    /// `display` and `window` must refer to a live window that outlives the
    /// returned surface.
    pub unsafe fn new(
        instance: &Arc<Instance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(instance.entry(), instance.handle(), display, window, None)
                .map_err(|e| RhiError::Surface(format!("Failed to create Vulkan surface: {}", e)))?
        };
        info!("Vulkan surface created");

        Ok(Self {
            instance: instance.clone(),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .surface_loader()
                .destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

