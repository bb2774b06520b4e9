//! Configuration and stage-input validation errors
//!
//! Every variant is a fail-fast condition detected before any remote call
//! is made, so no destructive action can follow one of these.

use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Allowlist contains characters outside the permitted set
    #[error("allowlist has invalid characters: {0:?}")]
    InvalidAllowlistCharacters(String),

    /// Allowlist pattern could not be compiled
    #[error("allowlist pattern '{pattern}' is invalid: {reason}")]
    InvalidAllowlistPattern { pattern: String, reason: String },

    /// A required field is empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// An account identifier is not twelve digits
    #[error("account id must be 12 digits, got: {0}")]
    InvalidAccountId(String),

    /// Organizational-unit scope without an OU id
    #[error("scope is organizational-unit but no organizational unit id was provided")]
    MissingOrganizationalUnit,

    /// Retry backoff would start above its own ceiling
    #[error("retry min delay ({min_ms}ms) exceeds retry max delay ({max_ms}ms)")]
    RetryDelayOrder { min_ms: u64, max_ms: u64 },

    /// Field-level validation failures reported by garde
    #[error("invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    /// Failed to parse JSON configuration or stage input
    #[error("failed to parse input: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to read a configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::Empty("role_name").to_string(),
            "role_name cannot be empty"
        );
        assert_eq!(
            ConfigError::InvalidAccountId("12ab".to_string()).to_string(),
            "account id must be 12 digits, got: 12ab"
        );
    }

    #[test]
    fn test_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::io("/etc/rolesweep.json", io_err);
        assert!(err.to_string().contains("/etc/rolesweep.json"));
    }
}
