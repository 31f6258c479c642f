//! Profile activation orchestrator
//!
//! `WireGuardManager` is the API the presentation layer calls. It never
//! stores which profile is active: every answer is derived from a fresh
//! `wg show`. It keeps at most one profile up by taking down every other
//! active profile before bringing a new one up.
//!
//! All operations are blocking and may take up to their timeout multiplied
//! by the retry budget. State-changing operations, and the reads that
//! derive state, are serialized by one lock. A concurrent read therefore
//! waits for an in-flight activation to finish.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::profile::{OperationResult, ProfileInfo, ProfileStatus, Readiness, Validation};
use crate::registry::ProfileRegistry;
use crate::retry::RetryPolicy;
use crate::runner::{command_line, CommandExecutor, CommandOutcome, ElevatedRunner};
use crate::status;

/// Programs that must be resolvable besides the elevation program
const REQUIRED_TOOLS: [&str; 2] = ["wg", "wg-quick"];

pub struct WireGuardManager {
    registry: ProfileRegistry,
    executor: Arc<dyn CommandExecutor>,
    retry: RetryPolicy,
    status_timeout: Duration,
    switch_timeout: Duration,
    elevate_command: String,
    /// Held for the whole of every operation that queries or changes state
    operation_lock: Mutex<()>,
    /// Last profile seen or made active. A display hint only, never consulted
    /// by the manager itself.
    active_hint: Mutex<Option<String>>,
}

impl WireGuardManager {
    /// Create a manager that runs commands through the configured elevation
    /// program
    pub fn new(config: &ManagerConfig) -> Self {
        let runner = ElevatedRunner::new(config.elevate_command.clone());
        Self::with_executor(config, Arc::new(runner))
    }

    /// Create a manager on top of a custom executor
    pub fn with_executor(config: &ManagerConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        info!(
            "WireGuard manager: {} profile(s) in {:?}",
            config.profiles.len(),
            config.config_dir
        );
        Self {
            registry: ProfileRegistry::from_config(config),
            executor,
            retry: config.retry_policy(),
            status_timeout: config.status_timeout(),
            switch_timeout: config.switch_timeout(),
            elevate_command: config.elevate_command.clone(),
            operation_lock: Mutex::new(()),
            active_hint: Mutex::new(None),
        }
    }

    /// Configured profile names in priority order
    pub fn profiles(&self) -> &[String] {
        self.registry.profiles()
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Last known active profile. May be stale; use `get_active_profile` for
    /// an authoritative answer.
    pub fn cached_active_profile(&self) -> Option<String> {
        lock(&self.active_hint).clone()
    }

    pub fn check_profile_exists(&self, name: &str) -> bool {
        self.registry.exists(name)
    }

    pub fn validate_profile(&self, name: &str) -> Validation {
        self.registry.validate(name)
    }

    /// Profile whose interface is currently up, derived from `wg show`
    pub fn get_active_profile(&self) -> Option<String> {
        let _guard = lock(&self.operation_lock);
        let raw = self.query_status();
        self.derive_active(raw.as_deref())
    }

    pub fn get_profile_status(&self, name: &str) -> ProfileStatus {
        let _guard = lock(&self.operation_lock);
        let raw = self.query_status();
        let active = self.derive_active(raw.as_deref());
        self.status_of(name, active.as_deref())
    }

    /// Snapshot of every configured profile, in priority order.
    ///
    /// Counters and peer details are filled in for the active profile only.
    /// When the status query fails, existing profiles report `Unknown`.
    pub fn get_all_profiles_info(&self) -> Vec<ProfileInfo> {
        let _guard = lock(&self.operation_lock);
        let raw = self.query_status();
        let active = self.derive_active(raw.as_deref());
        let interfaces = raw.as_deref().map(status::parse_status).unwrap_or_default();

        self.registry
            .profiles()
            .iter()
            .map(|name| {
                let status = if raw.is_some() {
                    self.status_of(name, active.as_deref())
                } else if self.registry.exists(name) {
                    ProfileStatus::Unknown
                } else {
                    ProfileStatus::Error
                };
                let mut info = ProfileInfo::new(name.clone(), status, self.registry.config_path(name));

                if status == ProfileStatus::Active {
                    let lower = name.to_lowercase();
                    match interfaces.iter().find(|i| i.name.to_lowercase().contains(&lower)) {
                        Some(interface) => {
                            let counters = interface.transfer();
                            info.interface_name = interface.name.clone();
                            info.public_key = interface.public_key.clone().unwrap_or_default();
                            if let Some(peer) = interface.peers.first() {
                                info.endpoint = peer.endpoint.clone().unwrap_or_default();
                                info.last_handshake = peer.latest_handshake.clone().unwrap_or_default();
                            }
                            info.transfer_rx = counters.rx;
                            info.transfer_tx = counters.tx;
                        }
                        None => {
                            let counters = status::parse_transfer_counters(raw.as_deref().unwrap_or(""));
                            info.transfer_rx = counters.rx;
                            info.transfer_tx = counters.tx;
                        }
                    }
                }
                info
            })
            .collect()
    }

    /// Take down every configured profile, in priority order.
    ///
    /// Every profile is attempted even after a failure; profiles already
    /// taken down stay down.
    pub fn turn_off_all(&self) -> OperationResult {
        let _guard = lock(&self.operation_lock);
        info!("Turning off all profiles: {}", self.registry.profiles().join(" -> "));

        let mut failed: Vec<(String, String)> = Vec::new();
        for name in self.registry.profiles() {
            let outcome = self.deactivate_profile(name);
            if !outcome.success {
                warn!("Failed to turn off {}: {}", name, outcome.output.trim());
                failed.push((name.clone(), outcome.output.trim().to_string()));
            }
        }

        if !failed.is_empty() {
            let details: Vec<String> = failed
                .iter()
                .map(|(name, reason)| format!("{}: {}", name, reason))
                .collect();
            return OperationResult::failed(format!("Failed to turn off: {}", details.join("; ")));
        }

        self.set_hint(None);
        info!("All profiles turned off");
        OperationResult::ok("All profiles turned off")
    }

    /// Make `name` the only active profile.
    ///
    /// Other active profiles are taken down first on a best-effort basis: a
    /// failure there is logged and does not stop the activation. The verdict
    /// of `wg-quick up` is returned as is.
    pub fn activate_profile(&self, name: &str) -> OperationResult {
        let _guard = lock(&self.operation_lock);

        if !self.registry.exists(name) {
            return OperationResult::failed(format!("Profile {} does not exist", name));
        }

        let validation = self.registry.validate(name);
        if !validation.valid {
            return OperationResult::failed(format!("Profile {} is invalid: {}", name, validation.reason));
        }

        let mut known: Vec<&str> = self.registry.profiles().iter().map(String::as_str).collect();
        if !self.registry.is_configured(name) {
            known.push(name);
        }
        let active = self
            .query_status()
            .map(|raw| status::parse_active_profiles(&raw, &known))
            .unwrap_or_default();
        let others: Vec<&String> = active.iter().filter(|p| p.as_str() != name).collect();

        if active.iter().any(|p| p == name) {
            warn!("Profile {} is already active", name);
            for other in others {
                self.deactivate_best_effort(other, name);
            }
            self.set_hint(Some(name.to_string()));
            return OperationResult::ok(format!("Profile {} is already active", name));
        }

        info!("Activating profile {}...", name);
        for other in others {
            self.deactivate_best_effort(other, name);
        }

        let outcome = self.activate_profile_internal(name);
        if outcome.success {
            self.set_hint(Some(name.to_string()));
            info!("Profile {} activated", name);
        } else {
            error!("Failed to activate profile {}: {}", name, outcome.output.trim());
        }

        OperationResult {
            success: outcome.success,
            message: outcome.output,
        }
    }

    /// Raw `wg show` output for display
    pub fn get_status_output(&self) -> String {
        let _guard = lock(&self.operation_lock);
        let outcome = self.retry.run(self.executor.as_ref(), &status_command(), self.status_timeout);
        if outcome.success {
            outcome.output.trim().to_string()
        } else {
            format!("Failed to get status: {}", outcome.output.trim())
        }
    }

    /// Diagnostic readiness check. Never gates any other operation.
    pub fn check_system_ready(&self) -> Readiness {
        let mut problems: Vec<String> = Vec::new();

        let mut programs = vec![self.elevate_command.as_str()];
        programs.extend(REQUIRED_TOOLS);
        for program in programs {
            if find_in_path(program).is_none() {
                problems.push(format!("Command {} not found", program));
            }
        }

        let config_dir = self.registry.config_dir();
        if !config_dir.exists() {
            problems.push(format!("Configuration directory does not exist: {}", config_dir.display()));
        } else if !is_readable(config_dir) {
            // Expected for a root-only /etc/wireguard; configured profiles
            // are trusted instead
            debug!("No read permission on {:?}", config_dir);
        }

        if !self.registry.profiles().iter().any(|p| self.registry.exists(p)) {
            problems.push("No WireGuard profile found".to_string());
        }

        if problems.is_empty() {
            debug!("System ready");
            Readiness {
                ready: true,
                message: "System ready".to_string(),
            }
        } else {
            let message = problems.join("; ");
            warn!("System not ready: {}", message);
            Readiness { ready: false, message }
        }
    }

    fn query_status(&self) -> Option<String> {
        let outcome = self.retry.run(self.executor.as_ref(), &status_command(), self.status_timeout);
        if outcome.success {
            Some(outcome.output)
        } else {
            warn!("Failed to query WireGuard status");
            None
        }
    }

    fn derive_active(&self, raw: Option<&str>) -> Option<String> {
        let active = raw.and_then(|raw| status::parse_active_interface(raw, self.registry.profiles()));
        self.set_hint(active.clone());
        active
    }

    /// Active when it is the derived active profile; otherwise Error when it
    /// does not exist, else Inactive
    fn status_of(&self, name: &str, active: Option<&str>) -> ProfileStatus {
        if active == Some(name) {
            ProfileStatus::Active
        } else if !self.registry.exists(name) {
            ProfileStatus::Error
        } else {
            ProfileStatus::Inactive
        }
    }

    fn set_hint(&self, profile: Option<String>) {
        *lock(&self.active_hint) = profile;
    }

    fn deactivate_best_effort(&self, name: &str, target: &str) {
        debug!("Turning off {} before activating {}", name, target);
        let outcome = self.deactivate_profile(name);
        if !outcome.success {
            warn!("Failed to turn off {}: {}", name, outcome.output.trim());
        }
    }

    fn activate_profile_internal(&self, name: &str) -> CommandOutcome {
        self.retry.run(
            self.executor.as_ref(),
            &command_line(&["wg-quick", "up", name]),
            self.switch_timeout,
        )
    }

    fn deactivate_profile(&self, name: &str) -> CommandOutcome {
        self.retry.run(
            self.executor.as_ref(),
            &command_line(&["wg-quick", "down", name]),
            self.switch_timeout,
        )
    }
}

fn status_command() -> Vec<String> {
    command_line(&["wg", "show"])
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolve `program` the way a shell would, through `$PATH`
fn find_in_path(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

fn is_readable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}
