//! Input validation for profile names
//!
//! Profile names end up on an elevated command line (`wg-quick up <name>`)
//! and in a filesystem path (`<config-dir>/<name>.conf`). The accepted set is
//! the one wg-quick itself enforces for interface names, minus a leading
//! dash.

use crate::error::{WgctlError, WgctlResult};

/// Linux interface names are limited to 15 characters, and wg-quick names
/// the interface after the profile
const MAX_PROFILE_NAME_LEN: usize = 15;

/// Punctuation wg-quick allows in an interface name
const ALLOWED_PUNCTUATION: [char; 5] = ['_', '=', '+', '.', '-'];

/// Validate a profile name
pub fn validate_profile_name(name: &str) -> WgctlResult<()> {
    if name.is_empty() {
        return Err(WgctlError::InvalidParameter(
            "Profile name cannot be empty".to_string()
        ));
    }

    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(WgctlError::InvalidParameter(
            format!("Profile name too long (max {} characters)", MAX_PROFILE_NAME_LEN)
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && !ALLOWED_PUNCTUATION.contains(&c) {
            return Err(WgctlError::InvalidParameter(
                format!("Invalid profile name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    // Would be read as an option by wg-quick
    if name.starts_with('-') {
        return Err(WgctlError::InvalidParameter(
            format!("Profile name '{}' cannot start with '-'", name)
        ));
    }

    Ok(())
}
