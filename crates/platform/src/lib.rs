//! Platform integration for frameflow.
//!
//! This crate provides:
//! - Windows that own their Vulkan surface and act as swapchain factories
//! - A window registry routing winit events by window id
//! - A SPIR-V shader loader acting as the shader factory

mod registry;
mod shader_loader;
mod window;

pub use registry::{WindowAction, WindowRegistry};
pub use shader_loader::ShaderLoader;
pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
