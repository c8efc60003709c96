//! Error types for the simulator
//!
//! Routing itself never fails: addressing misses, undecodable payloads and
//! duplicates all degrade silently. The only fallible surface is loading
//! configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a [`crate::SimConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;
