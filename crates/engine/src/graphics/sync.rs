//! Per-slot synchronization set of the graphics loop.

use frameflow_rhi::Backend;

use crate::error::EngineResult;

/// Image-acquired and render-complete semaphores plus the fence the host
/// waits on before reusing the slot.
pub(crate) struct FrameSyncObjects<B: Backend> {
    pub(crate) image_acquired: B::Semaphore,
    pub(crate) render_complete: B::Semaphore,
    pub(crate) in_flight: B::Fence,
    /// Set once the fence has been submitted and not yet waited on.
    armed: bool,
}

impl<B: Backend> FrameSyncObjects<B> {
    pub(crate) fn new(device: &B) -> EngineResult<Self> {
        Ok(Self {
            image_acquired: device.create_semaphore()?,
            render_complete: device.create_semaphore()?,
            in_flight: device.create_fence(false)?,
            armed: false,
        })
    }

    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }

    /// Waits on the fence from the slot's previous occupancy, once.
    pub(crate) fn wait_if_armed(&mut self, device: &B) -> EngineResult<()> {
        if self.armed {
            device.wait_fence(&self.in_flight, u64::MAX)?;
            device.reset_fence(&self.in_flight)?;
            self.armed = false;
        }
        Ok(())
    }

    /// Replaces the image-acquired semaphore, which may have been left
    /// pending by an acquisition whose frame was skipped.
    pub(crate) fn renew_image_acquired(&mut self, device: &B) -> EngineResult<()> {
        self.image_acquired = device.create_semaphore()?;
        Ok(())
    }
}
