//! Configuration management (`frameflow.toml`).
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_FILTER;

/// Upper bound on frames in flight accepted by [`Config::validate`].
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Frame pacing settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Driver and device selection
    #[serde(default)]
    pub device: DeviceConfig,
    /// Presentation window
    #[serde(default)]
    pub window: WindowConfig,
    /// Shader module lookup
    #[serde(default)]
    pub shaders: ShaderConfig,
    /// Log filtering
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame pacing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of frame slots (default: 2, 0 means default)
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: u32,
    /// Swapchain acquire bound in milliseconds (default: 1000)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Native queues requested from each family (default: 4)
    #[serde(default = "default_queues_per_family")]
    pub queues_per_family: u32,
}

/// Which driver implementation backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Real GPU through Vulkan
    #[default]
    Vulkan,
    /// CPU simulation, no window or GPU required
    Headless,
}

/// Device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Backend selection (default: vulkan)
    #[serde(default)]
    pub backend: BackendKind,
    /// Enable Vulkan validation layers (default: false)
    #[serde(default)]
    pub validation: bool,
}

/// Window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Shader loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Directory holding compiled `.spv` modules (default: assets/shaders)
    #[serde(default = "default_shader_directory")]
    pub directory: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_frames_in_flight() -> u32 {
    2
}
fn default_acquire_timeout_ms() -> u64 {
    1000
}
fn default_queues_per_family() -> u32 {
    4
}
fn default_title() -> String {
    "frameflow".to_string()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_shader_directory() -> String {
    "assets/shaders".to_string()
}
fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: default_frames_in_flight(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            queues_per_family: default_queues_per_family(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: default_shader_directory(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl EngineConfig {
    /// Frames in flight with 0 normalized to the default.
    pub fn effective_frames_in_flight(&self) -> u32 {
        if self.frames_in_flight == 0 {
            default_frames_in_flight()
        } else {
            self.frames_in_flight
        }
    }

    /// Acquire timeout in nanoseconds, as the driver expects it.
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout_ms.saturating_mul(1_000_000)
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Load a configuration file, falling back to defaults when it does not exist.
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.engine.effective_frames_in_flight() > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight {} exceeds maximum {}",
                self.engine.frames_in_flight, MAX_FRAMES_IN_FLIGHT
            )));
        }
        if self.engine.queues_per_family == 0 {
            return Err(Error::Config("queues_per_family must be at least 1".into()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }
}
