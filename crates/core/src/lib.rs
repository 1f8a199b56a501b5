//! Core utilities for frameflow.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame clock
//! - Configuration management

mod clock;
mod config;
mod error;
mod logging;

pub use clock::FrameClock;
pub use config::{
    BackendKind, Config, DeviceConfig, EngineConfig, LoggingConfig, MAX_FRAMES_IN_FLIGHT,
    ShaderConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging, init_logging_with};
