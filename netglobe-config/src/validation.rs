//! Custom validation functions for configuration.

use std::path::Path;

use validator::ValidationError;

/// Validate that an interface name follows Linux/BSD naming conventions.
pub fn validate_interface(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^[a-zA-Z0-9_.\-]+$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;

    if name.len() <= 15 && re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_interface")
            .with_message("interface names are 1-15 characters of [a-zA-Z0-9_.-]".into()))
    }
}

/// BPF filters are compiled by libpcap; only reject what can never compile.
pub fn validate_filter(filter: &str) -> Result<(), ValidationError> {
    if filter.contains(['\n', '\r', '\0']) {
        return Err(ValidationError::new("invalid_filter")
            .with_message("filter must be a single line".into()));
    }
    Ok(())
}

pub fn validate_non_empty_path(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        Err(ValidationError::new("empty_path"))
    } else {
        Ok(())
    }
}

/// Bucket and object names are single path components.
pub fn validate_object_name(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9_.\-]*$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_object_name"))
    }
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error", "off"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
