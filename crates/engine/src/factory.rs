//! Collaborators the engine calls into: shader modules and swapchain
//! parameters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frameflow_rhi::{Backend, SwapchainDesc, vk};

use crate::error::EngineResult;

/// Source of shader modules by name. Implementations cache as they see fit
/// and must tolerate concurrent calls.
pub trait ShaderFactory<B: Backend>: Send + Sync {
    fn get_module(&self, name: &str) -> EngineResult<Arc<B::ShaderModule>>;
}

/// Shared flag asking the frame loop to rebuild its swapchain before the next
/// acquisition.
#[derive(Clone, Debug, Default)]
pub struct RecreateRequest(Arc<AtomicBool>);

impl RecreateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Supplies the surface and swapchain parameters for a graphics engine.
///
/// `create_info` decides format, extent, present mode, alpha and transform;
/// sharing mode and image usage are fixed by the backend.
pub trait SwapchainFactory<B: Backend>: Send + Sync {
    fn create_info(&self, device: &B) -> EngineResult<SwapchainDesc>;

    fn surface(&self) -> &B::Surface;

    /// Hands over the flag to raise when the surface changes (for example on
    /// a window resize).
    fn set_recreate_request(&self, request: RecreateRequest);
}

/// Swapchain factory over a surface that has no window of its own to ask
/// for a size. `fallback_extent` is used only when the surface leaves the
/// extent to the swapchain.
pub struct SurfaceSwapchainFactory<B: Backend> {
    surface: B::Surface,
    fallback_extent: vk::Extent2D,
}

impl<B: Backend> SurfaceSwapchainFactory<B> {
    pub fn new(surface: B::Surface, fallback_extent: vk::Extent2D) -> Self {
        Self {
            surface,
            fallback_extent,
        }
    }
}

impl<B: Backend> SwapchainFactory<B> for SurfaceSwapchainFactory<B> {
    fn create_info(&self, device: &B) -> EngineResult<SwapchainDesc> {
        let support = device.surface_support(&self.surface)?;
        Ok(SwapchainDesc::from_support(&support, self.fallback_extent)?)
    }

    fn surface(&self) -> &B::Surface {
        &self.surface
    }

    fn set_recreate_request(&self, _request: RecreateRequest) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameflow_rhi::headless::HeadlessBackend;

    #[test]
    fn test_recreate_request_take_clears() {
        let request = RecreateRequest::new();
        let shared = request.clone();
        assert!(!request.take());
        shared.raise();
        assert!(request.is_raised());
        assert!(request.take());
        assert!(!shared.is_raised());
    }

    #[test]
    fn test_surface_factory_uses_surface_extent() {
        let backend = HeadlessBackend::universal(1);
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let factory = SurfaceSwapchainFactory::<HeadlessBackend>::new(
            backend.create_surface(extent),
            vk::Extent2D {
                width: 1,
                height: 1,
            },
        );
        let desc = factory.create_info(&backend).unwrap();
        assert_eq!(desc.extent, extent);
        assert_eq!(desc.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(desc.min_image_count, 3);
    }
}
