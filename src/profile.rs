//! Profile data model shared by the registry, the status parser and the
//! orchestrator.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Derived status of a single profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// The tool reports an interface belonging to this profile
    Active,
    /// Known profile with no matching interface
    Inactive,
    /// Profile does not exist or its configuration blocks activation
    Error,
    /// Status could not be derived (the status query itself failed)
    Unknown,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Snapshot of a profile, recomputed on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub status: ProfileStatus,
    pub config_path: PathBuf,
    /// The following are only populated when `status` is `Active`
    pub interface_name: String,
    pub public_key: String,
    pub endpoint: String,
    pub last_handshake: String,
    pub transfer_rx: u64,
    pub transfer_tx: u64,
}

impl ProfileInfo {
    pub fn new(name: impl Into<String>, status: ProfileStatus, config_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            status,
            config_path,
            interface_name: String::new(),
            public_key: String::new(),
            endpoint: String::new(),
            last_handshake: String::new(),
            transfer_rx: 0,
            transfer_tx: 0,
        }
    }
}

/// Verdict of a state-changing or diagnostic operation.
///
/// The message is free text meant for display; callers that special-case a
/// failure (e.g. a cancelled authorization prompt) match on its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Outcome of `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub reason: String,
}

impl Validation {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self { valid: true, reason: reason.into() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, reason: reason.into() }
    }
}

/// Outcome of the readiness diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub message: String,
}
