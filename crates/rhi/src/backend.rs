//! The native driver boundary.
//!
//! [`Backend`] is the only surface the frame pacing layer talks to. It covers
//! queue lookup, command recording brackets, fences and semaphores, submission,
//! swapchain image acquisition and presentation. Rendering commands themselves
//! are recorded by application code against the concrete backend types.

use ash::vk;

use crate::error::RhiResult;
use crate::swapchain::{SwapchainDesc, SwapchainSupportDetails};

/// Capability set of a queue family, or the set requested by a consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueueCaps {
    pub present: bool,
    pub graphics: bool,
    pub compute: bool,
    pub transfer: bool,
}

impl QueueCaps {
    /// Graphics work that ends in presentation.
    pub const PRESENT_GRAPHICS: Self = Self {
        present: true,
        graphics: true,
        compute: false,
        transfer: false,
    };

    /// Graphics, compute and transfer without presentation support.
    pub const UNIVERSAL: Self = Self {
        present: false,
        graphics: true,
        compute: true,
        transfer: true,
    };

    /// Returns true if every capability set in `request` is also set here.
    pub fn is_superset_of(&self, request: &QueueCaps) -> bool {
        (self.present || !request.present)
            && (self.graphics || !request.graphics)
            && (self.compute || !request.compute)
            && (self.transfer || !request.transfer)
    }

    pub(crate) fn from_flags(flags: vk::QueueFlags, present: bool) -> Self {
        let graphics = flags.contains(vk::QueueFlags::GRAPHICS);
        let compute = flags.contains(vk::QueueFlags::COMPUTE);
        // Graphics and compute families support transfer implicitly.
        let transfer = flags.contains(vk::QueueFlags::TRANSFER) || graphics || compute;
        Self {
            present,
            graphics,
            compute,
            transfer,
        }
    }
}

/// One hardware queue family as exposed by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamily {
    /// Family index in enumeration order.
    pub index: u32,
    /// What queues of this family can do.
    pub caps: QueueCaps,
    /// Number of native queues the device created for this family.
    pub queue_count: u32,
}

/// Result of a swapchain image acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// Image acquired.
    Ready(u32),
    /// Image acquired, but the swapchain no longer matches the surface exactly.
    Suboptimal(u32),
    /// The swapchain can no longer present to the surface.
    OutOfDate,
    /// No image became available within the timeout.
    Timeout,
}

/// Result of a present request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Ok,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Returns true if the swapchain should be rebuilt before the next acquisition.
    pub fn needs_recreate(&self) -> bool {
        !matches!(self, PresentStatus::Ok)
    }
}

/// Buffer usage patterns supported by [`Backend::create_buffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Uniform buffer written from the host every frame.
    Uniform,
    /// Storage buffer written from the host.
    Storage,
    /// Staging buffer used as a transfer source.
    Staging,
}

impl BufferUsage {
    /// Vulkan usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Human-readable name, used in allocation names and logs.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Uniform => "Uniform",
            BufferUsage::Storage => "Storage",
            BufferUsage::Staging => "Staging",
        }
    }
}

/// One queue submission: a list of command buffers, the semaphores to wait on
/// (with the stage that waits), and the semaphores to signal.
pub struct Submission<'a, B: Backend + ?Sized> {
    pub commands: &'a [&'a B::CommandBuffer],
    pub wait: &'a [(&'a B::Semaphore, vk::PipelineStageFlags)],
    pub signal: &'a [&'a B::Semaphore],
}

/// Read access to a swapchain's presentable images.
pub trait SwapchainImages {
    fn image_count(&self) -> u32;
    fn extent(&self) -> vk::Extent2D;
    fn format(&self) -> vk::Format;
}

/// A device the frame pacing layer can drive.
///
/// Objects returned by `create_*` release their native resources on drop.
/// Every method takes `&self`; implementations are shared behind `Arc`.
/// Calls that touch a queue (`submit`, `present`, `queue_wait_idle`,
/// `create_swapchain`) require the caller to hold that queue exclusively.
pub trait Backend: Send + Sync + 'static {
    type Queue: Clone + Send + Sync + std::fmt::Debug + 'static;
    type CommandPool: Send + Sync + 'static;
    type CommandBuffer: Send + Sync + 'static;
    type Semaphore: Send + Sync + 'static;
    type Fence: Send + Sync + 'static;
    type Surface: Send + Sync + 'static;
    type Swapchain: SwapchainImages + Send + Sync + 'static;
    type Buffer: Send + Sync + 'static;
    type ShaderModule: Send + Sync + 'static;

    // =========================================================================
    // Queues
    // =========================================================================

    /// Queue families in enumeration order.
    fn queue_families(&self) -> &[QueueFamily];

    /// Fetches the native queue `index` of `family`.
    fn get_queue(&self, family: u32, index: u32) -> RhiResult<Self::Queue>;

    /// Blocks until all work submitted to `queue` has completed.
    fn queue_wait_idle(&self, queue: &Self::Queue) -> RhiResult<()>;

    // =========================================================================
    // Commands
    // =========================================================================

    /// Creates a pool whose buffers can be individually reset.
    fn create_command_pool(&self, family: u32) -> RhiResult<Self::CommandPool>;

    fn allocate_command_buffer(&self, pool: &Self::CommandPool) -> RhiResult<Self::CommandBuffer>;

    /// Resets `commands` and begins one-time-submit recording.
    fn begin_commands(&self, commands: &Self::CommandBuffer) -> RhiResult<()>;

    fn end_commands(&self, commands: &Self::CommandBuffer) -> RhiResult<()>;

    // =========================================================================
    // Synchronization
    // =========================================================================

    fn create_semaphore(&self) -> RhiResult<Self::Semaphore>;

    fn create_fence(&self, signaled: bool) -> RhiResult<Self::Fence>;

    /// Blocks until `fence` is signaled or `timeout_ns` elapses.
    fn wait_fence(&self, fence: &Self::Fence, timeout_ns: u64) -> RhiResult<()>;

    fn reset_fence(&self, fence: &Self::Fence) -> RhiResult<()>;

    fn submit(
        &self,
        queue: &Self::Queue,
        submission: &Submission<'_, Self>,
        fence: Option<&Self::Fence>,
    ) -> RhiResult<()>;

    // =========================================================================
    // Presentation
    // =========================================================================

    /// Capabilities, formats and present modes of `surface` on this device.
    fn surface_support(&self, surface: &Self::Surface) -> RhiResult<SwapchainSupportDetails>;

    /// Builds a swapchain with exclusive sharing and color-attachment usage,
    /// every image ready for presentation.
    fn create_swapchain(
        &self,
        queue: &Self::Queue,
        surface: &Self::Surface,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self::Swapchain>;

    fn acquire_next_image(
        &self,
        swapchain: &Self::Swapchain,
        signal: &Self::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireStatus>;

    fn present(
        &self,
        queue: &Self::Queue,
        swapchain: &Self::Swapchain,
        image_index: u32,
        wait: &Self::Semaphore,
    ) -> RhiResult<PresentStatus>;

    // =========================================================================
    // Resources
    // =========================================================================

    /// Creates a host-visible buffer of `size` bytes.
    fn create_buffer(&self, size: u64, usage: BufferUsage) -> RhiResult<Self::Buffer>;

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> RhiResult<()>;

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<Self::ShaderModule>;
}
