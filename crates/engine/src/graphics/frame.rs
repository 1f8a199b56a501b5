//! What one iteration of the graphics loop hands out and reports.

use std::sync::Arc;

use frameflow_rhi::Backend;

use crate::engine::EngineBase;
use crate::frame::FrameSlot;
use crate::primitive::AnyPrimitive;

/// View of the frame being recorded.
pub struct SwapFrame<'a, B: Backend> {
    pub(crate) engine: &'a EngineBase<B>,
    pub(crate) slot: &'a mut FrameSlot<B>,
    pub(crate) swapchain: &'a B::Swapchain,
    pub(crate) image_index: u32,
}

impl<'a, B: Backend> SwapFrame<'a, B> {
    #[inline]
    pub fn engine(&self) -> &EngineBase<B> {
        self.engine
    }

    #[inline]
    pub fn device(&self) -> &Arc<B> {
        self.engine.device()
    }

    #[inline]
    pub fn slot(&self) -> &FrameSlot<B> {
        self.slot
    }

    #[inline]
    pub fn slot_index(&self) -> usize {
        self.slot.index()
    }

    /// Command buffer being recorded for this frame.
    #[inline]
    pub fn commands(&self) -> &B::CommandBuffer {
        self.slot.commands()
    }

    #[inline]
    pub fn swapchain(&self) -> &B::Swapchain {
        self.swapchain
    }

    /// Index of the acquired swapchain image.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Keeps `primitive` alive until this slot comes around again.
    pub fn use_primitive<P: AnyPrimitive>(&mut self, primitive: &Arc<P>) {
        self.slot.use_primitive(primitive);
    }
}

/// Why an iteration ended without presenting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No image became available within the acquire timeout.
    Timeout,
    /// The surface has a zero-sized extent; recreation is deferred.
    Minimized,
    /// The swapchain was out of date or suboptimal and has been rebuilt.
    Recreated,
}

/// Result of one iteration of the graphics loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image: u32 },
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, FrameOutcome::Presented { .. })
    }
}
