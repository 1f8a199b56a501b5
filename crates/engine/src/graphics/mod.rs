//! Graphics frame loop.
//!
//! One iteration of [`GraphicsEngine::render_frame`]:
//!
//! ```text
//! NORMAL ──> ACQUIRING ──ready──────────> RECORDING ──> SUBMITTING ──> NORMAL
//!               │ timeout ───────────────────────────────────────────> NORMAL (skipped)
//!               │ out of date / suboptimal, minimized ───────────────> NORMAL (skipped)
//!               └ out of date / suboptimal ──> RECREATING ───────────> NORMAL (skipped)
//! ```
//!
//! Before acquiring for a slot, the fence of that slot's previous occupancy
//! is waited on once. This is what bounds the number of frames in flight.

mod frame;
mod sync;

use std::sync::Arc;

use frameflow_core::EngineConfig;
use frameflow_rhi::{AcquireStatus, Backend, QueueCaps, Submission, SwapchainImages, vk};
use tracing::{debug, error, info, trace, warn};

use crate::context::Context;
use crate::engine::{EngineBase, FramedEngine};
use crate::error::{EngineError, EngineResult};
use crate::factory::{RecreateRequest, SwapchainFactory};
use sync::FrameSyncObjects;

pub use frame::{FrameOutcome, SkipReason, SwapFrame};

/// Default bound on swapchain image acquisition: one second.
pub const DEFAULT_ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Parameters for [`GraphicsEngine::new`].
pub struct GraphicsEngineCreateInfo<B: Backend> {
    pub swapchain_factory: Arc<dyn SwapchainFactory<B>>,
    pub frames_in_flight: usize,
    pub acquire_timeout_ns: u64,
}

impl<B: Backend> GraphicsEngineCreateInfo<B> {
    pub fn new(swapchain_factory: Arc<dyn SwapchainFactory<B>>) -> Self {
        Self {
            swapchain_factory,
            frames_in_flight: crate::DEFAULT_FRAMES_IN_FLIGHT,
            acquire_timeout_ns: DEFAULT_ACQUIRE_TIMEOUT_NS,
        }
    }

    pub fn from_config(
        swapchain_factory: Arc<dyn SwapchainFactory<B>>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            swapchain_factory,
            frames_in_flight: config.effective_frames_in_flight() as usize,
            acquire_timeout_ns: config.acquire_timeout_ns(),
        }
    }
}

/// Where the frame loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Normal,
    Acquiring,
    Recording,
    Submitting,
    Recreating,
}

/// Handle returned by [`GraphicsEngine::add_swapchain_callbacks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type BeforeDestroy = Box<dyn FnMut() + Send>;
type AfterCreate<B> = Box<dyn FnMut(&<B as Backend>::Swapchain) + Send>;

struct SwapchainCallbacks<B: Backend> {
    id: CallbackId,
    before_destroy: BeforeDestroy,
    after_create: AfterCreate<B>,
}

/// Framed engine that presents to a swapchain.
pub struct GraphicsEngine<B: Backend> {
    framed: FramedEngine<B>,
    sync: Vec<FrameSyncObjects<B>>,
    // Declared before the factory so it is destroyed before the surface.
    swapchain: Option<B::Swapchain>,
    callbacks: Vec<SwapchainCallbacks<B>>,
    factory: Arc<dyn SwapchainFactory<B>>,
    recreate: RecreateRequest,
    next_callback_id: u64,
    acquire_timeout_ns: u64,
    state: FrameState,
}

impl<B: Backend> GraphicsEngine<B> {
    /// Allocates a `{present, graphics}` queue, the frame slots and their
    /// synchronization sets, and builds the first swapchain. If the surface
    /// is minimized, the swapchain is deferred to the first frame that finds
    /// it restored.
    pub fn new(context: &Context<B>, info: GraphicsEngineCreateInfo<B>) -> EngineResult<Self> {
        let base = Arc::new(EngineBase::new(
            context,
            QueueCaps::PRESENT_GRAPHICS,
            info.frames_in_flight,
        )?);
        let framed = FramedEngine::new(base.clone())?;
        let sync = (0..base.frames_in_flight())
            .map(|_| FrameSyncObjects::<B>::new(base.device()))
            .collect::<EngineResult<Vec<_>>>()?;

        let recreate = RecreateRequest::new();
        info.swapchain_factory.set_recreate_request(recreate.clone());

        let mut engine = Self {
            framed,
            sync,
            swapchain: None,
            callbacks: Vec::new(),
            factory: info.swapchain_factory,
            recreate,
            next_callback_id: 0,
            acquire_timeout_ns: info.acquire_timeout_ns,
            state: FrameState::Normal,
        };

        if engine.surface_minimized()? {
            info!("Surface minimized at startup, deferring swapchain creation");
            engine.recreate.raise();
        } else {
            engine.recreate_swapchain()?;
        }

        info!(
            "Graphics engine created with {} frames in flight",
            base.frames_in_flight()
        );
        Ok(engine)
    }

    #[inline]
    pub fn base(&self) -> &Arc<EngineBase<B>> {
        self.framed.base()
    }

    #[inline]
    pub fn framed(&self) -> &FramedEngine<B> {
        &self.framed
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn current_slot_index(&self) -> usize {
        self.framed.current_slot_index()
    }

    /// The live swapchain, absent only while creation is deferred.
    #[inline]
    pub fn swapchain(&self) -> Option<&B::Swapchain> {
        self.swapchain.as_ref()
    }

    /// A handle to the flag that forces recreation before the next frame.
    pub fn recreate_request(&self) -> RecreateRequest {
        self.recreate.clone()
    }

    /// Shrinks or restores the slot rotation.
    pub fn set_frames_in_flight(&mut self, count: usize) -> EngineResult<()> {
        self.framed.set_dynamic_count(count)
    }

    /// Registers callbacks around swapchain recreation. `before_destroy` runs
    /// while the old swapchain still exists; `after_create` gets the new one.
    pub fn add_swapchain_callbacks(
        &mut self,
        before_destroy: impl FnMut() + Send + 'static,
        after_create: impl FnMut(&B::Swapchain) + Send + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        self.callbacks.push(SwapchainCallbacks {
            id,
            before_destroy: Box::new(before_destroy),
            after_create: Box::new(after_create),
        });
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_swapchain_callbacks(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|c| c.id != id);
        self.callbacks.len() != before
    }

    /// Runs one iteration: wait, acquire, record with `job`, submit, present.
    ///
    /// Timeouts and surface loss are reported as [`FrameOutcome::Skipped`];
    /// only unrecoverable failures are errors.
    pub fn render_frame<F>(&mut self, job: F) -> EngineResult<FrameOutcome>
    where
        F: FnOnce(&mut SwapFrame<'_, B>) -> EngineResult<()>,
    {
        let outcome = self.render_frame_inner(job);
        self.transition(FrameState::Normal);
        outcome
    }

    /// Renders frames while `inter_frame_job` returns true. The queue is
    /// waited idle on every exit path.
    pub fn run<F, G>(&mut self, mut frame_job: F, mut inter_frame_job: G) -> EngineResult<()>
    where
        F: FnMut(&mut SwapFrame<'_, B>) -> EngineResult<()>,
        G: FnMut() -> bool,
    {
        let mut result = Ok(());
        while inter_frame_job() {
            if let Err(e) = self.render_frame(&mut frame_job) {
                error!("Frame loop stopped: {}", e);
                result = Err(e);
                break;
            }
        }
        let idle = self.framed.base().wait_idle();
        result.and(idle)
    }

    fn render_frame_inner<F>(&mut self, job: F) -> EngineResult<FrameOutcome>
    where
        F: FnOnce(&mut SwapFrame<'_, B>) -> EngineResult<()>,
    {
        if self.recreate.take() || self.swapchain.is_none() {
            if self.surface_minimized()? {
                self.recreate.raise();
                debug!("Surface minimized, skipping frame");
                return Ok(FrameOutcome::Skipped(SkipReason::Minimized));
            }
            self.recreate_swapchain()?;
        }

        let base = self.framed.base().clone();
        let device = base.device();
        let slot_index = self.framed.current_slot_index();

        self.transition(FrameState::Acquiring);
        self.sync[slot_index].wait_if_armed(device)?;
        let swapchain = self.swapchain.as_ref().ok_or_else(missing_swapchain)?;
        let status = device.acquire_next_image(
            swapchain,
            &self.sync[slot_index].image_acquired,
            self.acquire_timeout_ns,
        )?;

        let image_index = match status {
            AcquireStatus::Ready(index) => index,
            AcquireStatus::Timeout => {
                warn!("Swapchain image acquisition timed out, skipping frame");
                return Ok(FrameOutcome::Skipped(SkipReason::Timeout));
            }
            AcquireStatus::Suboptimal(_) | AcquireStatus::OutOfDate => {
                if self.surface_minimized()? {
                    self.recreate.raise();
                    debug!("Swapchain lost while minimized, deferring recreation");
                    return Ok(FrameOutcome::Skipped(SkipReason::Minimized));
                }
                warn!("Swapchain {:?} on acquire, recreating", status);
                self.recreate_swapchain()?;
                return Ok(FrameOutcome::Skipped(SkipReason::Recreated));
            }
        };

        self.transition(FrameState::Recording);
        let slot = self.framed.begin_current_slot()?;
        let swapchain = self.swapchain.as_ref().ok_or_else(missing_swapchain)?;
        let mut frame = SwapFrame {
            engine: &base,
            slot,
            swapchain,
            image_index,
        };
        if let Err(e) = job(&mut frame) {
            self.abandon_frame(slot_index);
            return Err(e);
        }

        self.state = FrameState::Submitting;
        let ended = self.framed.end_and_advance()?;
        let slot = self
            .framed
            .slot(ended)
            .ok_or_else(|| EngineError::Configuration(format!("slot {} vanished", ended)))?;
        let sync = &mut self.sync[ended];
        {
            let queue = base.queue().acquire();
            device.submit(
                &queue,
                &Submission {
                    commands: &[slot.commands()],
                    wait: &[(
                        &sync.image_acquired,
                        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    )],
                    signal: &[&sync.render_complete],
                },
                Some(&sync.in_flight),
            )?;
        }
        sync.arm();

        let present = {
            let queue = base.queue().acquire();
            device.present(&queue, swapchain, image_index, &sync.render_complete)?
        };
        if present.needs_recreate() {
            warn!("Swapchain {:?} on present, recreating before next frame", present);
            self.recreate.raise();
        }

        trace!("Presented image {} from slot {}", image_index, ended);
        Ok(FrameOutcome::Presented {
            slot: ended,
            image: image_index,
        })
    }

    /// Closes the slot of a frame whose job failed. Its image was acquired but
    /// will never be presented, and its image-acquired semaphore stays
    /// signalled, so the swapchain is rebuilt before the next acquisition.
    fn abandon_frame(&mut self, slot_index: usize) {
        if let Err(e) = self.framed.abandon_current_slot() {
            error!("Failed to close slot {} after a failed frame: {}", slot_index, e);
        }
        self.recreate.raise();
        warn!("Frame job failed in slot {}, swapchain will be recreated", slot_index);
    }

    /// Waits idle, notifies dependents, and rebuilds the swapchain from a
    /// fresh create-info.
    fn recreate_swapchain(&mut self) -> EngineResult<()> {
        self.transition(FrameState::Recreating);
        let base = self.framed.base().clone();
        let device = base.device();
        base.wait_idle()?;

        if let Some(old) = self.swapchain.take() {
            for callbacks in &mut self.callbacks {
                (callbacks.before_destroy)();
            }
            drop(old);
        }

        let desc = self.factory.create_info(device)?;
        let swapchain = {
            let queue = base.queue().acquire();
            device.create_swapchain(&queue, self.factory.surface(), &desc)?
        };
        for sync in &mut self.sync {
            sync.renew_image_acquired(device)?;
        }

        let swapchain: &B::Swapchain = self.swapchain.insert(swapchain);
        info!(
            "Swapchain ready: {}x{}, {} images",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );
        for callbacks in &mut self.callbacks {
            (callbacks.after_create)(swapchain);
        }
        Ok(())
    }

    fn surface_minimized(&self) -> EngineResult<bool> {
        let support = self
            .framed
            .base()
            .device()
            .surface_support(self.factory.surface())?;
        Ok(support.is_minimized())
    }

    fn transition(&mut self, next: FrameState) {
        if self.state != next {
            trace!("Frame state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

impl<B: Backend> Drop for GraphicsEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.framed.base().wait_idle() {
            error!("Failed to wait for queue idle during drop: {}", e);
        }
    }
}

fn missing_swapchain() -> EngineError {
    EngineError::Configuration("graphics engine has no swapchain".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::SurfaceSwapchainFactory;
    use frameflow_rhi::headless::HeadlessBackend;

    fn engine() -> GraphicsEngine<HeadlessBackend> {
        let device = Arc::new(HeadlessBackend::universal(1));
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let factory = Arc::new(SurfaceSwapchainFactory::new(
            device.create_surface(extent),
            extent,
        ));
        let context = Context::new(device);
        GraphicsEngine::new(&context, GraphicsEngineCreateInfo::<HeadlessBackend>::new(factory))
            .unwrap()
    }

    #[test]
    fn test_create_info_defaults() {
        let device = HeadlessBackend::universal(1);
        let factory = Arc::new(SurfaceSwapchainFactory::new(
            device.create_surface(vk::Extent2D {
                width: 1,
                height: 1,
            }),
            vk::Extent2D {
                width: 1,
                height: 1,
            },
        ));
        let info = GraphicsEngineCreateInfo::<HeadlessBackend>::new(factory);
        assert_eq!(info.frames_in_flight, crate::DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(info.acquire_timeout_ns, DEFAULT_ACQUIRE_TIMEOUT_NS);
    }

    #[test]
    fn test_callback_ids_are_unique() {
        let mut engine = engine();
        let a = engine.add_swapchain_callbacks(|| {}, |_| {});
        let b = engine.add_swapchain_callbacks(|| {}, |_| {});
        assert_ne!(a, b);
        assert!(engine.remove_swapchain_callbacks(a));
        assert!(engine.remove_swapchain_callbacks(b));
        assert!(!engine.remove_swapchain_callbacks(a));
    }

    #[test]
    fn test_new_engine_is_idle_with_swapchain() {
        let engine = engine();
        assert_eq!(engine.state(), FrameState::Normal);
        assert_eq!(engine.current_slot_index(), 0);
        assert!(engine.swapchain().is_some());
        assert!(!engine.recreate_request().is_raised());
    }

    #[test]
    fn test_engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<GraphicsEngine<HeadlessBackend>>();
    }
}
