//! Error types shared across frameflow crates.

use thiserror::Error;

/// Main error type for configuration, windowing and startup plumbing.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration values that parse but cannot be used
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed TOML configuration
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the frameflow core error type.
pub type Result<T> = std::result::Result<T, Error>;
