//! Native windows as swapchain factories.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frameflow_core::{Error, Result, WindowConfig};
use frameflow_engine::{EngineResult, RecreateRequest, SwapchainFactory};
use frameflow_rhi::vulkan::{Instance, Surface, VulkanBackend};
use frameflow_rhi::{Backend, SwapchainDesc, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

/// A winit window together with the Vulkan surface presenting to it.
///
/// The window supplies swapchain parameters to a graphics engine and raises
/// its recreate request when it is resized.
pub struct Window {
    // Declared first so the surface is destroyed before the window.
    surface: Surface,
    window: Arc<WinitWindow>,
    recreate: Mutex<Option<RecreateRequest>>,
}

impl Window {
    /// Opens a resizable window and creates its surface.
    pub fn new(
        event_loop: &ActiveEventLoop,
        instance: &Arc<Instance>,
        config: &WindowConfig,
    ) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;
        tracing::info!("Window created: {}x{}", config.width, config.height);

        let display_handle = window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: the handles come from `window`, which is stored next to the
        // surface and dropped after it.
        let surface = unsafe {
            Surface::new(instance, display_handle.as_raw(), window_handle.as_raw())
                .map_err(|e| Error::Window(format!("Failed to create surface: {}", e)))?
        };

        Ok(Self {
            surface,
            window: Arc::new(window),
            recreate: Mutex::new(None),
        })
    }

    #[inline]
    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    /// Get a reference to the underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Get an Arc reference to the underlying winit window.
    pub fn inner_arc(&self) -> Arc<WinitWindow> {
        self.window.clone()
    }

    /// Current drawable size in pixels.
    pub fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn is_minimized(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Call on `WindowEvent::Resized`. Forces swapchain recreation before the
    /// next frame of the engine presenting to this window.
    pub fn resized(&self, size: PhysicalSize<u32>) {
        tracing::debug!("Window resized: {}x{}", size.width, size.height);
        if let Some(request) = self.recreate_slot().as_ref() {
            request.raise();
        }
    }

    fn recreate_slot(&self) -> MutexGuard<'_, Option<RecreateRequest>> {
        self.recreate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SwapchainFactory<VulkanBackend> for Window {
    fn create_info(&self, device: &VulkanBackend) -> EngineResult<SwapchainDesc> {
        let support = device.surface_support(&self.surface)?;
        Ok(SwapchainDesc::from_support(&support, self.extent())?)
    }

    fn surface(&self) -> &Surface {
        &self.surface
    }

    fn set_recreate_request(&self, request: RecreateRequest) {
        *self.recreate_slot() = Some(request);
    }
}
