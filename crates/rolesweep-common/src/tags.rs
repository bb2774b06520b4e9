//! Tag keys, marker policy and fixed identifiers
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `Owner` | Email address of the role owner (read only) |
//! | `DeactivateReason` | Written when the deny-all marker policy is attached |

/// Tag key holding the owner's email address
pub const TAG_OWNER: &str = "Owner";

/// Tag key written on deactivation
pub const TAG_DEACTIVATE_REASON: &str = "DeactivateReason";

/// Tag value written on deactivation
pub const DEACTIVATE_REASON: &str =
    "Role is in grace time period before deletion. Deactivated by rolesweep";

/// Name of the inline deny-all policy; its presence marks a role as deactivated
pub const DENY_ALL_POLICY_NAME: &str = "DenyAllRolesweep";

/// Inline policy document denying every action on every resource
pub const DENY_ALL_POLICY_DOCUMENT: &str =
    r#"{"Version":"2012-10-17","Statement":[{"Effect":"Deny","Action":"*","Resource":"*"}]}"#;

/// Finding generator identifier
pub const GENERATOR_ID: &str = "CUSTOM:rolesweep-unused-role-check";

/// Finding schema version
pub const FINDING_SCHEMA_VERSION: &str = "2018-10-08";

/// Finding type classification
pub const FINDING_TYPE: &str = "Software and Configuration Checks/TPPs/Initial Access";

/// Resource type for role findings
pub const RESOURCE_TYPE_ROLE: &str = "AwsIamRoleDetails";

/// Build the ARN of a role in an account.
pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}

/// Build the findings product ARN owned by the security account.
pub fn product_arn(region: &str, security_account_id: &str) -> String {
    format!(
        "arn:aws:securityhub:{region}:{security_account_id}:product/{security_account_id}/default"
    )
}
