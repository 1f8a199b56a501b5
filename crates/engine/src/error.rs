//! Engine error types.

use frameflow_rhi::RhiError;
use thiserror::Error;

/// Errors surfaced by engine construction and the frame loop.
///
/// Acquisition timeouts and surface loss are not errors; the frame loop
/// reports them as skipped frames.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid engine parameters (frames in flight, dynamic slot count)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No queue family can satisfy a capability request
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// Native driver failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Primitive type mismatch or missing object
    #[error("Primitive error: {0}")]
    Primitive(String),

    /// Shader lookup failed
    #[error("Shader error: {0}")]
    Shader(String),
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
