//! Role exemption patterns
//!
//! The allowlist is a pipe-delimited list of Unix shell-style patterns matched
//! against a role's path followed by its name, e.g. `/service-role/*` matches
//! `/service-role/aws-codestar-service-role`. `*` also matches `/`, so use it
//! sparingly. A role matching any pattern is never evaluated.

use crate::error::ConfigError;
use regex::Regex;

/// Characters permitted in an allowlist string: the IAM name character set
/// plus the path separator, the pattern separator and the wildcard.
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-+=,.@_/|*".contains(c)
}

/// Translate a shell-style pattern into an anchored regex. Only `*` is a
/// wildcard; everything else matches literally.
fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).map_err(|e| ConfigError::InvalidAllowlistPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Compiled set of exemption patterns
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    patterns: Vec<Regex>,
}

impl Allowlist {
    /// Validate and compile a pipe-delimited pattern string.
    ///
    /// An empty string yields an empty allowlist. Empty segments (`a||b`) are
    /// ignored.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        if !raw.chars().all(is_allowed_char) {
            return Err(ConfigError::InvalidAllowlistCharacters(raw.to_string()));
        }

        let patterns = raw
            .split('|')
            .filter(|p| !p.is_empty())
            .map(compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Check whether a role path+name (e.g. `/service-role/foo`) is exempt
    pub fn is_allowed(&self, role_path_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.is_match(role_path_name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_role_pattern() {
        let list = Allowlist::parse("/service-role/*").unwrap();
        assert!(list.is_allowed("/service-role/aws-codestar-service-role"));
        assert!(!list.is_allowed("/app/service-role"));
    }

    #[test]
    fn multiple_patterns() {
        let list = Allowlist::parse("/service-role/*|/breakglass-admin|*Deploy*").unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.is_allowed("/breakglass-admin"));
        assert!(list.is_allowed("/ci/BlueDeployRole"));
        assert!(!list.is_allowed("/breakglass-admin-2"));
    }

    #[test]
    fn wildcard_crosses_path_separators() {
        let list = Allowlist::parse("/aws-reserved/*").unwrap();
        assert!(list.is_allowed("/aws-reserved/sso.amazonaws.com/AWSReservedSSO_Admin"));
    }

    #[test]
    fn dots_match_literally() {
        let list = Allowlist::parse("/a.b").unwrap();
        assert!(list.is_allowed("/a.b"));
        assert!(!list.is_allowed("/axb"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let list = Allowlist::parse("/Admin").unwrap();
        assert!(!list.is_allowed("/admin"));
    }

    #[test]
    fn empty_allowlist_allows_nothing() {
        let list = Allowlist::parse("").unwrap();
        assert!(list.is_empty());
        assert!(!list.is_allowed("/anything"));

        let list = Allowlist::parse("||").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn rejects_disallowed_characters() {
        for raw in ["/service-role/*;rm", "/a b", "/role?", "/[ab]"] {
            let err = Allowlist::parse(raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidAllowlistCharacters(_)),
                "expected character error for {raw}"
            );
        }
    }

    #[test]
    fn rejects_invalid_suffix_after_valid_prefix() {
        // Every character is checked, not just a leading run
        assert!(Allowlist::parse("/service-role/*$").is_err());
    }
}
