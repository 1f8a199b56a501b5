//! Render hardware interface for the frame pacing layer.
//!
//! This crate defines the [`Backend`] trait the engine drives and provides two
//! implementations:
//! - [`vulkan::VulkanBackend`] over `ash` and `gpu-allocator`
//! - [`headless::HeadlessBackend`], a scriptable in-memory device for tests
//!   and for running without a GPU
//!
//! It also owns the backend-neutral swapchain selection policy and SPIR-V
//! helpers.

mod error;

pub mod backend;
pub mod headless;
pub mod shader;
pub mod swapchain;
pub mod vulkan;

pub use backend::{
    AcquireStatus, Backend, BufferUsage, PresentStatus, QueueCaps, QueueFamily, Submission,
    SwapchainImages,
};
pub use error::{RhiError, RhiResult};
pub use swapchain::{SwapchainDesc, SwapchainSupportDetails};

// Re-export ash types that users might need
pub use ash::vk;
