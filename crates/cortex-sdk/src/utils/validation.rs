//! Validation Utilities
//!
//! Checks applied to plugin metadata before registration.

use thiserror::Error;

/// Validation error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Field required: {0}")]
    Required(String),
}

/// Validate a plugin ID
///
/// Valid IDs are 1-128 characters of lowercase ASCII letters, digits, `-`,
/// `_` and `.` segment separators, starting with a letter. Separators may not
/// repeat or end the ID.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    let Some(first) = id.chars().next() else {
        return Err(ValidationError::Required("id".into()));
    };

    if id.len() > 128 {
        return Err(ValidationError::InvalidId(
            "ID must be 128 characters or less".into(),
        ));
    }

    if !first.is_ascii_lowercase() {
        return Err(ValidationError::InvalidId(format!(
            "'{}' must start with a lowercase letter",
            id
        )));
    }

    let is_separator = |c: char| matches!(c, '-' | '_' | '.');
    let mut previous_was_separator = false;

    for (i, c) in id.chars().enumerate() {
        let separator = is_separator(c);
        if !separator && !c.is_ascii_lowercase() && !c.is_ascii_digit() {
            return Err(ValidationError::InvalidId(format!(
                "invalid character '{}' at position {} in '{}'",
                c, i, id
            )));
        }
        if separator && previous_was_separator {
            return Err(ValidationError::InvalidId(format!(
                "'{}' has consecutive separators",
                id
            )));
        }
        previous_was_separator = separator;
    }

    if previous_was_separator {
        return Err(ValidationError::InvalidId(format!(
            "'{}' cannot end with a separator",
            id
        )));
    }

    Ok(())
}

/// Validate a semver version string
///
/// Accepts `Major.Minor` or `Major.Minor.Patch`, optionally followed by a
/// `-prerelease` of alphanumerics and dots.
pub fn validate_version(version: &str) -> Result<(), ValidationError> {
    if version.is_empty() {
        return Err(ValidationError::Required("version".into()));
    }

    let (numbers, prerelease) = match version.split_once('-') {
        Some((numbers, prerelease)) => (numbers, Some(prerelease)),
        None => (version, None),
    };

    let parts: Vec<&str> = numbers.split('.').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(ValidationError::InvalidVersion(format!(
            "'{}' must be Major.Minor or Major.Minor.Patch",
            version
        )));
    }

    for part in parts {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidVersion(format!(
                "'{}' has a non-numeric component '{}'",
                version, part
            )));
        }
        if part.len() > 1 && part.starts_with('0') {
            return Err(ValidationError::InvalidVersion(format!(
                "'{}' has a leading zero in '{}'",
                version, part
            )));
        }
    }

    if let Some(prerelease) = prerelease {
        if prerelease.is_empty()
            || !prerelease.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
        {
            return Err(ValidationError::InvalidVersion(format!(
                "'{}' has an invalid prerelease",
                version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_valid() {
        assert!(validate_id("maintenance").is_ok());
        assert!(validate_id("doc-refresh").is_ok());
        assert!(validate_id("cleanup_plugin").is_ok());
        assert!(validate_id("cortex.health2").is_ok());
        assert!(validate_id("a").is_ok());
    }

    #[test]
    fn test_validate_id_invalid() {
        assert_eq!(validate_id(""), Err(ValidationError::Required("id".into())));
        assert!(validate_id("9lives").is_err());
        assert!(validate_id("Cleanup").is_err());
        assert!(validate_id("doc--refresh").is_err());
        assert!(validate_id("doc._refresh").is_err());
        assert!(validate_id("cleanup.").is_err());
        assert!(validate_id("has space").is_err());
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1.0").is_ok());
        assert!(validate_version("2.1.3").is_ok());
        assert!(validate_version("1.0.0-beta.2").is_ok());

        assert!(validate_version("").is_err());
        assert!(validate_version("1").is_err());
        assert!(validate_version("1.0.0.0").is_err());
        assert!(validate_version("01.0").is_err());
        assert!(validate_version("v1.0").is_err());
        assert!(validate_version("1.0.0-").is_err());
    }
}
