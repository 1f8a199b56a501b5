//! Frame pacing layer over a [`frameflow_rhi::Backend`].
//!
//! This crate provides:
//! - A queue registry that hands out exclusive queues and shares them under
//!   a lock once a device runs out
//! - Frame slots that retire their resources when the slot comes around again
//! - Copy-on-write and swap update strategies for per-frame objects
//! - A graphics frame loop that recreates its swapchain on surface loss

mod context;
mod engine;
mod error;
mod executor;
mod factory;
mod frame;
mod queue;
mod registry;

pub mod graphics;
pub mod policies;
pub mod primitive;

pub use context::Context;
pub use engine::{EngineBase, FramedEngine};
pub use error::{EngineError, EngineResult};
pub use executor::{Executor, Immediate};
pub use factory::{RecreateRequest, ShaderFactory, SurfaceSwapchainFactory, SwapchainFactory};
pub use frame::FrameSlot;
pub use graphics::{
    CallbackId, FrameOutcome, FrameState, GraphicsEngine, GraphicsEngineCreateInfo, SkipReason,
    SwapFrame,
};
pub use primitive::{AnyPrimitive, Primitive, PrimitiveCell, PrimitiveHandle};
pub use queue::{Queue, QueueGuard, QueueSharing};
pub use registry::QueueRegistry;

/// Slots used when the caller does not ask for a specific count.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
