//! Error types for wgctl
//!
//! Profile operations report their outcome as plain `{success, message}`
//! values and never use these. `WgctlError` covers the ambient paths around
//! them: configuration loading, logging setup, log export and dispatcher
//! construction.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WgctlError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Async runtime unavailable or misused
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<serde_json::Error> for WgctlError {
    fn from(error: serde_json::Error) -> Self {
        WgctlError::Parse(error.to_string())
    }
}

pub type WgctlResult<T> = Result<T, WgctlError>;
