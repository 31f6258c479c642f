//! Configuration management for wgctl
//!
//! The configuration is an optional JSON document, by default at
//! `~/.local/share/wg-manager/config.json`:
//!
//! ```json
//! { "profiles": ["App", "bomBox", "usa"] }
//! ```
//!
//! Every other field is optional and falls back to its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{WgctlError, WgctlResult};
use crate::retry::RetryPolicy;
use crate::validation::validate_profile_name;

/// Profiles used when no configuration provides any
pub const DEFAULT_PROFILES: [&str; 3] = ["App", "bomBox", "usa"];

/// Application data directory, relative to the user's home
const DATA_DIR: &str = ".local/share/wg-manager";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Profile names in priority order
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,
    /// Directory holding `<name>.conf` files
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Program that runs commands with elevated privileges
    #[serde(default = "default_elevate_command")]
    pub elevate_command: String,
    /// Timeout for `wg show` (seconds)
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
    /// Timeout for `wg-quick up/down` (seconds)
    #[serde(default = "default_switch_timeout")]
    pub switch_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Treat configured profiles as existing (and valid when their file is
    /// unreadable) without looking at the filesystem. `/etc/wireguard` is
    /// usually root-only, so this is on by default.
    #[serde(default = "default_trust_configured")]
    pub trust_configured_profiles: bool,
}

fn default_profiles() -> Vec<String> {
    DEFAULT_PROFILES.iter().map(|p| p.to_string()).collect()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wireguard")
}

fn default_elevate_command() -> String {
    "pkexec".to_string()
}

fn default_status_timeout() -> u64 {
    30
}

fn default_switch_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_trust_configured() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            config_dir: default_config_dir(),
            elevate_command: default_elevate_command(),
            status_timeout_secs: default_status_timeout(),
            switch_timeout_secs: default_switch_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            trust_configured_profiles: default_trust_configured(),
        }
    }
}

/// `~/.local/share/wg-manager`. The home directory comes from `$HOME`, or
/// the password database when `$HOME` is unset.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR))
}

/// `~/.local/share/wg-manager/config.json`, if the home directory is known
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

impl ManagerConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> WgctlResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WgctlError::Config(format!("Failed to read config: {}", e)))?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| WgctlError::Config(format!("Failed to parse config: {}", e)))?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    /// or unusable
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No configuration path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            debug!("Configuration file not found: {:?}", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                info!("Loaded profiles from {:?}: {:?}", path, config.profiles);
                config
            }
            Err(e) => {
                error!("Failed to load configuration from {:?}: {}", path, e);
                info!("Using default profiles: {:?}", DEFAULT_PROFILES);
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> WgctlResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| WgctlError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WgctlError::Config(format!("Failed to create directory {:?}: {}", parent, e)))?;
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| WgctlError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Drop blank and duplicate profile names; fall back to the default list
    /// when nothing usable remains
    fn normalize(&mut self) {
        let mut profiles: Vec<String> = Vec::with_capacity(self.profiles.len());
        for name in self.profiles.drain(..) {
            let name = name.trim().to_string();
            if name.is_empty() {
                warn!("Ignoring blank profile name in configuration");
            } else if profiles.contains(&name) {
                warn!("Ignoring duplicate profile '{}' in configuration", name);
            } else {
                if let Err(e) = validate_profile_name(&name) {
                    warn!("Configured profile will never be found: {}", e);
                }
                profiles.push(name);
            }
        }

        if profiles.is_empty() {
            info!("Using default profiles: {:?}", DEFAULT_PROFILES);
            profiles = default_profiles();
        }
        self.profiles = profiles;
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}
