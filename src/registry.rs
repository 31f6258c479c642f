//! Profile registry and configuration validator
//!
//! The registry is built once from `ManagerConfig` and never changes. Its
//! checks deliberately fail open for configured profiles: `/etc/wireguard`
//! is normally unreadable for the desktop user, and a configured profile is
//! trusted to exist there (see `ManagerConfig::trust_configured_profiles`).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::profile::Validation;
use crate::validation::validate_profile_name;

/// Required section header of a WireGuard configuration
const INTERFACE_SECTION: &str = "[Interface]";

#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<String>,
    config_dir: PathBuf,
    trust_configured: bool,
}

impl ProfileRegistry {
    pub fn new(profiles: Vec<String>, config_dir: PathBuf, trust_configured: bool) -> Self {
        Self {
            profiles,
            config_dir,
            trust_configured,
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.profiles.clone(),
            config.config_dir.clone(),
            config.trust_configured_profiles,
        )
    }

    /// Configured profile names in priority order
    pub fn profiles(&self) -> &[String] {
        &self.profiles
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p == name)
    }

    /// Location of the profile's configuration file
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.conf", name))
    }

    /// Whether the profile exists.
    ///
    /// Configured profiles are assumed to exist without touching the
    /// filesystem. Other names must have a configuration file; an unreadable
    /// directory counts as "does not exist".
    pub fn exists(&self, name: &str) -> bool {
        if let Err(e) = validate_profile_name(name) {
            warn!("Rejecting profile name: {}", e);
            return false;
        }

        if self.trust_configured && self.is_configured(name) {
            debug!("Assuming configured profile exists: {}", name);
            return true;
        }

        let path = self.config_path(name);
        match path.try_exists() {
            Ok(exists) => {
                debug!("Profile {} exists: {}", name, exists);
                exists
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!("No permission to read {:?}, assuming profile does not exist", path);
                false
            }
            Err(e) => {
                error!("Failed to check profile {}: {}", name, e);
                false
            }
        }
    }

    /// Check that the profile exists and its configuration has an
    /// `[Interface]` section.
    ///
    /// When the file cannot be read (no permission, or a configured profile
    /// whose file is not visible) the check is skipped and the profile is
    /// treated as valid.
    pub fn validate(&self, name: &str) -> Validation {
        if !self.exists(name) {
            return Validation::invalid(format!("Profile {} does not exist", name));
        }

        let path = self.config_path(name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                if !content.contains(INTERFACE_SECTION) {
                    warn!("Profile {} has no {} section", name, INTERFACE_SECTION);
                    return Validation::invalid(format!("Missing {} section", INTERFACE_SECTION));
                }
                info!("Profile {} passed validation", name);
                Validation::valid("OK")
            }
            Err(e) if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::NotFound) => {
                if self.is_configured(name) {
                    debug!("Configured profile {}, skipping validation", name);
                    Validation::valid("Configured profile, validation skipped")
                } else {
                    warn!("Cannot read configuration of {}, skipping validation", name);
                    Validation::valid("Configuration not readable, assuming valid")
                }
            }
            Err(e) => {
                error!("Failed to read profile {}: {}", name, e);
                Validation::invalid(format!("Failed to read configuration: {}", e))
            }
        }
    }
}
