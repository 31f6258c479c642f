//! wgctl - WireGuard profile switching library
//!
//! Manages a fixed set of named WireGuard profiles by driving `wg` and
//! `wg-quick` through an elevation program (`pkexec` by default):
//! - Elevated command execution with timeouts and bounded retry
//! - Parsing of the `wg show` status dump
//! - Profile registry and configuration validation
//! - Mutually exclusive activation and bulk deactivation
//! - Background dispatch of blocking operations for front ends
//!
//! The active profile is never stored; it is derived from the tool's output
//! on every request.

pub mod error;
pub mod config;
pub mod logging;
pub mod validation;
pub mod profile;
pub mod runner;
pub mod retry;
pub mod status;
pub mod registry;
pub mod manager;
pub mod dispatch;

// Re-export commonly used types
pub use error::{WgctlError, WgctlResult};
pub use config::ManagerConfig;
pub use profile::{OperationResult, ProfileInfo, ProfileStatus, Readiness, Validation};
pub use runner::{CommandExecutor, CommandOutcome, ElevatedRunner, FailureKind};
pub use retry::RetryPolicy;
pub use status::{InterfaceStatus, PeerStatus, TransferCounters};
pub use registry::ProfileRegistry;
pub use manager::WireGuardManager;
pub use dispatch::{Completion, Dispatcher, Operation, OperationKind};
