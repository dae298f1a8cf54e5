//! # Input Validation
//!
//! Package-name and version checks applied to publish requests before any
//! storage or database work happens.
//!
//! Accepted names follow npm's grammar: an optional `@scope/` prefix and a
//! package segment, both made of lowercase letters, digits, `-`, `.`, `_`
//! and `~`, neither starting with `.`, `-` or `_`.

use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum allowed package name length (npm's own limit)
pub const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 256;

fn package_name_regex() -> &'static Regex {
    static PACKAGE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    PACKAGE_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^(?:@[a-z0-9~][a-z0-9._~-]*/)?[a-z0-9~][a-z0-9._~-]*$").unwrap_or_else(|e| {
            panic!("Failed to compile package name regex: {}. This is a bug in the code - the regex pattern should be valid.", e)
        })
    })
}

/// Returns true when `name` is an acceptable, optionally scoped, package name.
///
/// # Examples
///
/// ```
/// # use registry_server::validation::is_valid_package_name;
/// assert!(is_valid_package_name("left-pad"));
/// assert!(is_valid_package_name("@babel/core"));
/// assert!(!is_valid_package_name("LeftPad"));
/// assert!(!is_valid_package_name(".hidden"));
/// ```
pub fn is_valid_package_name(name: &str) -> bool {
    name.len() <= MAX_PACKAGE_NAME_LENGTH && package_name_regex().is_match(name)
}

/// [`is_valid_package_name`] as a request-level check.
pub fn validate_package_name(name: &str) -> AppResult<()> {
    if is_valid_package_name(name) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid package name".to_string()))
    }
}

/// Version strings end up inside storage keys and download filenames, so
/// only their shape is checked here; semver parsing is the client's business.
pub fn validate_version(version: &str) -> AppResult<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Invalid version '{}'",
            version
        )));
    }

    if version.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(AppError::BadRequest(format!(
            "Invalid version '{}'",
            version.escape_debug()
        )));
    }

    Ok(())
}
