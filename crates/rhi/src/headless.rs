//! CPU-simulated backend.
//!
//! `HeadlessBackend` implements [`Backend`] without a GPU or window system. It
//! is what the engine's tests drive, and the sample application falls back to
//! it when configured with `backend = "headless"`.
//!
//! The simulated GPU has two timing models:
//! - [`GpuTiming::Immediate`] completes every submission as soon as it is made,
//!   so fence waits never block.
//! - [`GpuTiming::Deferred`] keeps submissions pending until the host waits on
//!   one of their fences (or calls [`HeadlessBackend::retire_all`]). A wait on
//!   a pending fence retires submissions in order up to and including it and is
//!   recorded as blocking.
//!
//! Every driver call is appended to an event log that tests inspect.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use tracing::{debug, trace};

use crate::backend::{
    AcquireStatus, Backend, BufferUsage, PresentStatus, QueueCaps, QueueFamily, Submission,
    SwapchainImages,
};
use crate::error::{RhiError, RhiResult};
use crate::swapchain::{SwapchainDesc, SwapchainSupportDetails};

/// When simulated GPU work completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuTiming {
    Immediate,
    Deferred,
}

/// Scripted outcome for the next `acquire_next_image` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Acquire,
    Suboptimal,
    OutOfDate,
    Timeout,
}

/// One recorded driver call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadlessEvent {
    QueueFetched {
        family: u32,
        index: u32,
    },
    CommandsBegun {
        commands: u64,
    },
    CommandsEnded {
        commands: u64,
    },
    Submitted {
        family: u32,
        index: u32,
        commands: Vec<u64>,
        fence: Option<u64>,
    },
    FenceWaited {
        fence: u64,
        blocked: bool,
    },
    FenceReset {
        fence: u64,
    },
    QueueIdle {
        family: u32,
        index: u32,
    },
    SwapchainCreated {
        swapchain: u64,
        extent: vk::Extent2D,
    },
    SwapchainDestroyed {
        swapchain: u64,
    },
    Acquired {
        swapchain: u64,
        status: AcquireStatus,
    },
    Presented {
        swapchain: u64,
        image_index: u32,
        status: PresentStatus,
    },
    BufferWritten {
        buffer: u64,
        offset: u64,
        len: usize,
    },
}

struct State {
    timing: GpuTiming,
    events: Vec<HeadlessEvent>,
    fences: HashMap<u64, bool>,
    in_flight: VecDeque<Option<u64>>,
    acquire_script: VecDeque<ScriptedAcquire>,
    present_script: VecDeque<PresentStatus>,
    surfaces: HashMap<u64, vk::Extent2D>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_signaled(&self, fence: u64) -> bool {
        self.fences.get(&fence).copied().unwrap_or(false)
    }

    fn retire_next(&mut self) -> bool {
        match self.in_flight.pop_front() {
            Some(fence) => {
                if let Some(id) = fence {
                    self.fences.insert(id, true);
                }
                true
            }
            None => false,
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Native queue of the simulated device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessQueue {
    pub family: u32,
    pub index: u32,
}

pub struct HeadlessCommandPool {
    family: u32,
}

impl HeadlessCommandPool {
    pub fn family(&self) -> u32 {
        self.family
    }
}

pub struct HeadlessCommandBuffer {
    id: u64,
    recording: AtomicBool,
}

impl HeadlessCommandBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
}

pub struct HeadlessSemaphore {
    id: u64,
}

impl HeadlessSemaphore {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct HeadlessFence {
    id: u64,
}

impl HeadlessFence {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Simulated presentation surface with a settable extent.
pub struct HeadlessSurface {
    id: u64,
}

pub struct HeadlessSwapchain {
    id: u64,
    desc: SwapchainDesc,
    next_image: AtomicU32,
    state: Arc<Mutex<State>>,
}

impl HeadlessSwapchain {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn desc(&self) -> &SwapchainDesc {
        &self.desc
    }
}

impl SwapchainImages for HeadlessSwapchain {
    fn image_count(&self) -> u32 {
        self.desc.min_image_count
    }

    fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    fn format(&self) -> vk::Format {
        self.desc.format
    }
}

impl Drop for HeadlessSwapchain {
    fn drop(&mut self) {
        lock(&self.state)
            .events
            .push(HeadlessEvent::SwapchainDestroyed { swapchain: self.id });
        debug!("Destroyed headless swapchain {}", self.id);
    }
}

/// Host memory standing in for a GPU buffer.
pub struct HeadlessBuffer {
    id: u64,
    usage: BufferUsage,
    data: Mutex<Vec<u8>>,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct HeadlessShaderModule {
    id: u64,
    words: usize,
}

impl HeadlessShaderModule {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn word_count(&self) -> usize {
        self.words
    }
}

/// CPU-simulated device.
pub struct HeadlessBackend {
    families: Vec<QueueFamily>,
    state: Arc<Mutex<State>>,
}

impl HeadlessBackend {
    /// Creates a device exposing `families`, completing work immediately.
    pub fn new(families: Vec<QueueFamily>) -> Self {
        debug!("Created headless backend with {} queue families", families.len());
        Self {
            families,
            state: Arc::new(Mutex::new(State {
                timing: GpuTiming::Immediate,
                events: Vec::new(),
                fences: HashMap::new(),
                in_flight: VecDeque::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                surfaces: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// A device with one family that can do everything, including present.
    pub fn universal(queue_count: u32) -> Self {
        Self::new(vec![QueueFamily {
            index: 0,
            caps: QueueCaps {
                present: true,
                graphics: true,
                compute: true,
                transfer: true,
            },
            queue_count,
        }])
    }

    pub fn with_timing(self, timing: GpuTiming) -> Self {
        self.set_timing(timing);
        self
    }

    pub fn set_timing(&self, timing: GpuTiming) {
        lock(&self.state).timing = timing;
    }

    /// Creates a surface whose current extent is `extent`.
    pub fn create_surface(&self, extent: vk::Extent2D) -> HeadlessSurface {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.surfaces.insert(id, extent);
        HeadlessSurface { id }
    }

    /// Changes the surface extent. A zero dimension simulates a minimized window.
    pub fn set_surface_extent(&self, surface: &HeadlessSurface, extent: vk::Extent2D) {
        lock(&self.state).surfaces.insert(surface.id, extent);
    }

    /// Queues outcomes for upcoming acquisitions. Unscripted calls acquire normally.
    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = ScriptedAcquire>) {
        lock(&self.state).acquire_script.extend(outcomes);
    }

    /// Queues outcomes for upcoming presents. Unscripted calls return `Ok`.
    pub fn script_present(&self, outcomes: impl IntoIterator<Item = PresentStatus>) {
        lock(&self.state).present_script.extend(outcomes);
    }

    /// Completes every pending submission.
    pub fn retire_all(&self) {
        let mut state = lock(&self.state);
        while state.retire_next() {}
    }

    /// Number of submissions the simulated GPU has not completed yet.
    pub fn pending_submissions(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    pub fn is_fence_signaled(&self, fence: &HeadlessFence) -> bool {
        lock(&self.state).is_signaled(fence.id)
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<HeadlessEvent> {
        lock(&self.state).events.clone()
    }

    /// Drains the event log.
    pub fn take_events(&self) -> Vec<HeadlessEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }

    fn record(&self, event: HeadlessEvent) {
        trace!("headless: {:?}", event);
        lock(&self.state).events.push(event);
    }

    fn family(&self, family: u32) -> RhiResult<&QueueFamily> {
        self.families
            .iter()
            .find(|f| f.index == family)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no queue family {}", family)))
    }
}

impl Backend for HeadlessBackend {
    type Queue = HeadlessQueue;
    type CommandPool = HeadlessCommandPool;
    type CommandBuffer = HeadlessCommandBuffer;
    type Semaphore = HeadlessSemaphore;
    type Fence = HeadlessFence;
    type Surface = HeadlessSurface;
    type Swapchain = HeadlessSwapchain;
    type Buffer = HeadlessBuffer;
    type ShaderModule = HeadlessShaderModule;

    fn queue_families(&self) -> &[QueueFamily] {
        &self.families
    }

    fn get_queue(&self, family: u32, index: u32) -> RhiResult<HeadlessQueue> {
        let queue_count = self.family(family)?.queue_count;
        if index >= queue_count {
            return Err(RhiError::InvalidHandle(format!(
                "queue {} out of range for family {} ({} queues)",
                index, family, queue_count
            )));
        }
        self.record(HeadlessEvent::QueueFetched { family, index });
        Ok(HeadlessQueue { family, index })
    }

    fn queue_wait_idle(&self, queue: &HeadlessQueue) -> RhiResult<()> {
        let mut state = lock(&self.state);
        while state.retire_next() {}
        state.events.push(HeadlessEvent::QueueIdle {
            family: queue.family,
            index: queue.index,
        });
        Ok(())
    }

    fn create_command_pool(&self, family: u32) -> RhiResult<HeadlessCommandPool> {
        self.family(family)?;
        Ok(HeadlessCommandPool { family })
    }

    fn allocate_command_buffer(
        &self,
        _pool: &HeadlessCommandPool,
    ) -> RhiResult<HeadlessCommandBuffer> {
        let id = lock(&self.state).next_id();
        Ok(HeadlessCommandBuffer {
            id,
            recording: AtomicBool::new(false),
        })
    }

    fn begin_commands(&self, commands: &HeadlessCommandBuffer) -> RhiResult<()> {
        commands.recording.store(true, Ordering::Release);
        self.record(HeadlessEvent::CommandsBegun {
            commands: commands.id,
        });
        Ok(())
    }

    fn end_commands(&self, commands: &HeadlessCommandBuffer) -> RhiResult<()> {
        if !commands.recording.swap(false, Ordering::AcqRel) {
            return Err(RhiError::InvalidHandle(format!(
                "command buffer {} is not recording",
                commands.id
            )));
        }
        self.record(HeadlessEvent::CommandsEnded {
            commands: commands.id,
        });
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<HeadlessSemaphore> {
        let id = lock(&self.state).next_id();
        Ok(HeadlessSemaphore { id })
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<HeadlessFence> {
        let mut state = lock(&self.state);
        let id = state.next_id();
        state.fences.insert(id, signaled);
        Ok(HeadlessFence { id })
    }

    fn wait_fence(&self, fence: &HeadlessFence, _timeout_ns: u64) -> RhiResult<()> {
        let mut state = lock(&self.state);
        if state.is_signaled(fence.id) {
            state.events.push(HeadlessEvent::FenceWaited {
                fence: fence.id,
                blocked: false,
            });
            return Ok(());
        }

        while !state.is_signaled(fence.id) {
            if !state.retire_next() {
                return Err(RhiError::DeviceLost(format!(
                    "fence {} is not pending and will never signal",
                    fence.id
                )));
            }
        }
        state.events.push(HeadlessEvent::FenceWaited {
            fence: fence.id,
            blocked: true,
        });
        Ok(())
    }

    fn reset_fence(&self, fence: &HeadlessFence) -> RhiResult<()> {
        let mut state = lock(&self.state);
        if state.in_flight.contains(&Some(fence.id)) {
            return Err(RhiError::InvalidHandle(format!(
                "fence {} reset while in use by a pending submission",
                fence.id
            )));
        }
        state.fences.insert(fence.id, false);
        state
            .events
            .push(HeadlessEvent::FenceReset { fence: fence.id });
        Ok(())
    }

    fn submit(
        &self,
        queue: &HeadlessQueue,
        submission: &Submission<'_, Self>,
        fence: Option<&HeadlessFence>,
    ) -> RhiResult<()> {
        if let Some(recording) = submission.commands.iter().find(|c| c.is_recording()) {
            return Err(RhiError::InvalidHandle(format!(
                "command buffer {} submitted while recording",
                recording.id
            )));
        }

        let mut state = lock(&self.state);
        if let Some(fence) = fence
            && state.is_signaled(fence.id)
        {
            return Err(RhiError::InvalidHandle(format!(
                "fence {} submitted while signaled",
                fence.id
            )));
        }

        let fence_id = fence.map(|f| f.id);
        state.events.push(HeadlessEvent::Submitted {
            family: queue.family,
            index: queue.index,
            commands: submission.commands.iter().map(|c| c.id).collect(),
            fence: fence_id,
        });

        match state.timing {
            GpuTiming::Immediate => {
                if let Some(id) = fence_id {
                    state.fences.insert(id, true);
                }
            }
            GpuTiming::Deferred => state.in_flight.push_back(fence_id),
        }
        Ok(())
    }

    fn surface_support(&self, surface: &HeadlessSurface) -> RhiResult<SwapchainSupportDetails> {
        let extent = lock(&self.state)
            .surfaces
            .get(&surface.id)
            .copied()
            .ok_or_else(|| RhiError::Surface(format!("unknown surface {}", surface.id)))?;

        Ok(SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: extent,
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 16384,
                    height: 16384,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn create_swapchain(
        &self,
        _queue: &HeadlessQueue,
        surface: &HeadlessSurface,
        desc: &SwapchainDesc,
    ) -> RhiResult<HeadlessSwapchain> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::Swapchain(format!(
                "cannot create a {}x{} swapchain",
                desc.extent.width, desc.extent.height
            )));
        }

        let mut state = lock(&self.state);
        if !state.surfaces.contains_key(&surface.id) {
            return Err(RhiError::Surface(format!("unknown surface {}", surface.id)));
        }
        let id = state.next_id();
        state.events.push(HeadlessEvent::SwapchainCreated {
            swapchain: id,
            extent: desc.extent,
        });
        debug!(
            "Created headless swapchain {} ({}x{}, {} images)",
            id, desc.extent.width, desc.extent.height, desc.min_image_count
        );

        Ok(HeadlessSwapchain {
            id,
            desc: *desc,
            next_image: AtomicU32::new(0),
            state: self.state.clone(),
        })
    }

    fn acquire_next_image(
        &self,
        swapchain: &HeadlessSwapchain,
        _signal: &HeadlessSemaphore,
        _timeout_ns: u64,
    ) -> RhiResult<AcquireStatus> {
        let mut state = lock(&self.state);
        let scripted = state
            .acquire_script
            .pop_front()
            .unwrap_or(ScriptedAcquire::Acquire);

        let next = || {
            swapchain.next_image.fetch_add(1, Ordering::Relaxed) % swapchain.image_count()
        };
        let status = match scripted {
            ScriptedAcquire::Acquire => AcquireStatus::Ready(next()),
            ScriptedAcquire::Suboptimal => AcquireStatus::Suboptimal(next()),
            ScriptedAcquire::OutOfDate => AcquireStatus::OutOfDate,
            ScriptedAcquire::Timeout => AcquireStatus::Timeout,
        };
        state.events.push(HeadlessEvent::Acquired {
            swapchain: swapchain.id,
            status,
        });
        Ok(status)
    }

    fn present(
        &self,
        _queue: &HeadlessQueue,
        swapchain: &HeadlessSwapchain,
        image_index: u32,
        _wait: &HeadlessSemaphore,
    ) -> RhiResult<PresentStatus> {
        let mut state = lock(&self.state);
        let status = state.present_script.pop_front().unwrap_or(PresentStatus::Ok);
        state.events.push(HeadlessEvent::Presented {
            swapchain: swapchain.id,
            image_index,
            status,
        });
        Ok(status)
    }

    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RhiResult<HeadlessBuffer> {
        let id = lock(&self.state).next_id();
        Ok(HeadlessBuffer {
            id,
            usage,
            data: Mutex::new(vec![0; size as usize]),
        })
    }

    fn write_buffer(&self, buffer: &HeadlessBuffer, offset: u64, data: &[u8]) -> RhiResult<()> {
        {
            let mut contents = buffer.data.lock().unwrap_or_else(PoisonError::into_inner);
            let range = usize::try_from(offset)
                .ok()
                .and_then(|start| Some(start..start.checked_add(data.len())?))
                .filter(|range| range.end <= contents.len());
            let Some(range) = range else {
                return Err(RhiError::InvalidHandle(format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    contents.len()
                )));
            };
            contents[range].copy_from_slice(data);
        }
        self.record(HeadlessEvent::BufferWritten {
            buffer: buffer.id,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<HeadlessShaderModule> {
        if code.is_empty() {
            return Err(RhiError::Shader("empty SPIR-V module".to_string()));
        }
        let id = lock(&self.state).next_id();
        Ok(HeadlessShaderModule {
            id,
            words: code.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn submit_with(backend: &HeadlessBackend, fence: &HeadlessFence) {
        let queue = backend.get_queue(0, 0).unwrap();
        let pool = backend.create_command_pool(0).unwrap();
        let commands = backend.allocate_command_buffer(&pool).unwrap();
        backend.begin_commands(&commands).unwrap();
        backend.end_commands(&commands).unwrap();
        backend
            .submit(
                &queue,
                &Submission {
                    commands: &[&commands],
                    wait: &[],
                    signal: &[],
                },
                Some(fence),
            )
            .unwrap();
    }

    #[test]
    fn test_immediate_fence_signals_on_submit() {
        let backend = HeadlessBackend::universal(1);
        let fence = backend.create_fence(false).unwrap();
        submit_with(&backend, &fence);
        assert!(backend.is_fence_signaled(&fence));

        backend.wait_fence(&fence, u64::MAX).unwrap();
        assert!(backend.events().contains(&HeadlessEvent::FenceWaited {
            fence: fence.id(),
            blocked: false
        }));
    }

    #[test]
    fn test_deferred_wait_retires_in_order() {
        let backend = HeadlessBackend::universal(1).with_timing(GpuTiming::Deferred);
        let first = backend.create_fence(false).unwrap();
        let second = backend.create_fence(false).unwrap();
        submit_with(&backend, &first);
        submit_with(&backend, &second);
        assert_eq!(backend.pending_submissions(), 2);

        backend.wait_fence(&first, u64::MAX).unwrap();
        assert_eq!(backend.pending_submissions(), 1);
        assert!(!backend.is_fence_signaled(&second));
        assert!(backend.events().contains(&HeadlessEvent::FenceWaited {
            fence: first.id(),
            blocked: true
        }));
    }

    #[test]
    fn test_wait_on_unsubmitted_fence_fails() {
        let backend = HeadlessBackend::universal(1);
        let fence = backend.create_fence(false).unwrap();
        assert!(matches!(
            backend.wait_fence(&fence, u64::MAX),
            Err(RhiError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_resubmitting_signaled_fence_is_rejected() {
        let backend = HeadlessBackend::universal(1);
        let fence = backend.create_fence(true).unwrap();
        let queue = backend.get_queue(0, 0).unwrap();
        let result = backend.submit(
            &queue,
            &Submission {
                commands: &[],
                wait: &[],
                signal: &[],
            },
            Some(&fence),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_submit_while_recording_is_rejected() {
        let backend = HeadlessBackend::universal(1);
        let queue = backend.get_queue(0, 0).unwrap();
        let pool = backend.create_command_pool(0).unwrap();
        let commands = backend.allocate_command_buffer(&pool).unwrap();
        backend.begin_commands(&commands).unwrap();
        let result = backend.submit(
            &queue,
            &Submission {
                commands: &[&commands],
                wait: &[],
                signal: &[],
            },
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_get_queue_out_of_range() {
        let backend = HeadlessBackend::universal(2);
        assert!(backend.get_queue(0, 1).is_ok());
        assert!(backend.get_queue(0, 2).is_err());
        assert!(backend.get_queue(1, 0).is_err());
    }

    #[test]
    fn test_scripted_acquire_and_round_robin_images() {
        let backend = HeadlessBackend::universal(1);
        let queue = backend.get_queue(0, 0).unwrap();
        let surface = backend.create_surface(extent(64, 64));
        let desc = SwapchainDesc::from_support(
            &backend.surface_support(&surface).unwrap(),
            extent(64, 64),
        )
        .unwrap();
        let swapchain = backend.create_swapchain(&queue, &surface, &desc).unwrap();
        let semaphore = backend.create_semaphore().unwrap();

        backend.script_acquire([ScriptedAcquire::Timeout, ScriptedAcquire::OutOfDate]);
        let acquire = || backend.acquire_next_image(&swapchain, &semaphore, 0).unwrap();
        assert_eq!(acquire(), AcquireStatus::Timeout);
        assert_eq!(acquire(), AcquireStatus::OutOfDate);
        assert_eq!(acquire(), AcquireStatus::Ready(0));
        assert_eq!(acquire(), AcquireStatus::Ready(1));
        assert_eq!(acquire(), AcquireStatus::Ready(2));
        assert_eq!(acquire(), AcquireStatus::Ready(0));
    }

    #[test]
    fn test_minimized_surface_reports_zero_extent() {
        let backend = HeadlessBackend::universal(1);
        let surface = backend.create_surface(extent(64, 64));
        backend.set_surface_extent(&surface, extent(0, 0));
        assert!(backend.surface_support(&surface).unwrap().is_minimized());
    }

    #[test]
    fn test_swapchain_drop_is_logged() {
        let backend = HeadlessBackend::universal(1);
        let queue = backend.get_queue(0, 0).unwrap();
        let surface = backend.create_surface(extent(8, 8));
        let desc = SwapchainDesc::from_support(
            &backend.surface_support(&surface).unwrap(),
            extent(8, 8),
        )
        .unwrap();
        let swapchain = backend.create_swapchain(&queue, &surface, &desc).unwrap();
        let id = swapchain.id();
        drop(swapchain);
        assert_eq!(
            backend.events().last(),
            Some(&HeadlessEvent::SwapchainDestroyed { swapchain: id })
        );
    }

    #[test]
    fn test_buffer_write_bounds() {
        let backend = HeadlessBackend::universal(1);
        let buffer = backend.create_buffer(4, BufferUsage::Uniform).unwrap();
        backend.write_buffer(&buffer, 1, &[7, 8]).unwrap();
        assert_eq!(buffer.contents(), vec![0, 7, 8, 0]);
        assert!(backend.write_buffer(&buffer, 3, &[1, 2]).is_err());
        assert!(matches!(
            backend.write_buffer(&buffer, u64::MAX, &[1]),
            Err(RhiError::InvalidHandle(_))
        ));
        assert_eq!(buffer.contents(), vec![0, 7, 8, 0]);
    }

    #[test]
    fn test_headless_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HeadlessBackend>();
        assert_send_sync::<HeadlessSwapchain>();
        assert_send_sync::<HeadlessBuffer>();
    }
}
