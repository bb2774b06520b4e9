//! Workflow execution names
//!
//! Each emitted finding starts one workflow execution named
//! `{account}-{role}-{digest}-{unix_seconds}`. Names must stay under
//! [`MAX_EXECUTION_NAME_LEN`] characters and may only contain ASCII
//! letters, digits, `-` and `_`. The role component is rewritten and
//! shortened to fit, so the digest of the full role ARN is what keeps two
//! roles apart within one account and second.

use crate::defaults::MAX_EXECUTION_NAME_LEN;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Hex characters of the role ARN digest kept in the name
const DIGEST_LEN: usize = 8;

fn sanitize(c: char) -> char {
    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
        c
    } else {
        '_'
    }
}

fn arn_digest(role_arn: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role_arn.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(DIGEST_LEN);
    digest
}

/// Build the execution name for the finding on `role_arn` emitted at `at`.
pub fn execution_name(
    account_id: &str,
    role_name: &str,
    role_arn: &str,
    at: DateTime<Utc>,
) -> String {
    let timestamp = at.timestamp().to_string();
    let digest = arn_digest(role_arn);

    // Three separators plus the fixed components
    let fixed = account_id.len() + digest.len() + timestamp.len() + 3;
    let role_budget = (MAX_EXECUTION_NAME_LEN - 1).saturating_sub(fixed);

    let role: String = role_name.chars().map(sanitize).take(role_budget).collect();

    format!("{account_id}-{role}-{digest}-{timestamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn arn(account_id: &str, role_name: &str) -> String {
        format!("arn:aws:iam::{account_id}:role/{role_name}")
    }

    fn name(account_id: &str, role_name: &str) -> String {
        execution_name(account_id, role_name, &arn(account_id, role_name), at())
    }

    #[test]
    fn short_names_are_kept() {
        let name = name("111122223333", "R1");
        assert!(name.starts_with("111122223333-R1-"), "{name}");
        assert!(name.ends_with("-1772366400"), "{name}");
        assert_eq!(name.len(), "111122223333-R1--1772366400".len() + DIGEST_LEN);
    }

    #[test]
    fn same_role_same_name() {
        assert_eq!(name("111122223333", "R1"), name("111122223333", "R1"));
    }

    #[test]
    fn long_role_names_are_truncated() {
        let role = "r".repeat(200);
        let name = name("111122223333", &role);

        assert!(name.len() < MAX_EXECUTION_NAME_LEN, "len {}", name.len());
        assert!(name.starts_with("111122223333-rrr"));
        assert!(name.ends_with("-1772366400"));
    }

    #[test]
    fn unique_across_accounts_in_the_same_second() {
        let role = "x".repeat(200);
        assert_ne!(name("111122223333", &role), name("444455556666", &role));
    }

    #[test]
    fn truncated_names_with_a_shared_prefix_differ() {
        let prefix = "x".repeat(60);
        let a = name("111122223333", &format!("{prefix}-a"));
        let b = name("111122223333", &format!("{prefix}-b"));

        assert_ne!(a, b);
        assert!(a.len() < MAX_EXECUTION_NAME_LEN && b.len() < MAX_EXECUTION_NAME_LEN);
    }

    #[test]
    fn sanitized_collisions_differ() {
        let dotted = name("111122223333", "svc.deploy");
        let underscored = name("111122223333", "svc_deploy");

        assert!(dotted.starts_with("111122223333-svc_deploy-"));
        assert!(underscored.starts_with("111122223333-svc_deploy-"));
        assert_ne!(dotted, underscored);
    }

    #[test]
    fn invalid_characters_are_replaced() {
        let name = name("111122223333", "svc+deploy@ci.example");
        assert!(name.starts_with("111122223333-svc_deploy_ci_example-"));
        assert!(
            name.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }
}
