//! Role snapshots and the security finding record
//!
//! A [`Finding`] serializes to the findings-store wire shape (PascalCase
//! keys), which is also the document handed to the workflow driver as
//! execution input. Once built, a finding is never modified; the store
//! archives it on its own.

use crate::error::ConfigError;
use crate::status::RecordState;
use crate::tags::{
    FINDING_SCHEMA_VERSION, FINDING_TYPE, GENERATOR_ID, RESOURCE_TYPE_ROLE, TAG_OWNER,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strongly-typed AWS account ID (12-digit string)
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::Deref,
)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and wrap an account identifier
    pub fn parse(s: impl Into<String>) -> Result<Self, ConfigError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.len() == 12 && trimmed.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ConfigError::InvalidAccountId(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Most recent recorded use of a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUsed {
    pub at: DateTime<Utc>,
    pub region: Option<String>,
}

/// Point-in-time snapshot of a role, fetched fresh by every stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: String,
    /// IAM path, always beginning and ending with `/`
    pub path: String,
    pub arn: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<LastUsed>,
    pub tags: BTreeMap<String, String>,
}

impl RoleRecord {
    /// Path followed by name, the string allowlist patterns match against
    pub fn path_name(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        crate::days_between(self.created_at, now)
    }

    /// Days since last use, or `None` when the role has no usage record
    pub fn days_since_last_use(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_used
            .as_ref()
            .map(|used| crate::days_between(used.at, now))
    }

    pub fn last_used_region(&self) -> Option<&str> {
        self.last_used.as_ref().and_then(|u| u.region.as_deref())
    }

    /// Owner tag value if present anywhere in the tag set, else `default`.
    pub fn owner_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.tags
            .get(TAG_OWNER)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default)
    }
}

/// Severity block of a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Severity {
    pub label: String,
}

/// Resource reference inside a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FindingResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub id: String,
}

/// Free-form fields the later stages read back out of the finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDefinedFields {
    pub owner_email: String,
    pub role_name: String,
    pub target_account_id: AccountId,
    /// Carried as a string on the wire; the store only accepts string values
    #[serde(with = "u32_as_string")]
    pub max_days: u32,
}

/// Compliance violation for one unused role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Finding {
    pub schema_version: String,
    pub title: String,
    pub description: String,
    pub product_arn: String,
    /// Security account that owns the finding (not the role's account)
    pub aws_account_id: String,
    /// Role ARN; together with `product_arn` the de-duplication key
    pub id: String,
    pub generator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_defined_fields: UserDefinedFields,
    pub severity: Severity,
    pub resources: Vec<FindingResource>,
    pub types: Vec<String>,
    pub record_state: RecordState,
}

/// Values shared by every finding produced in one discovery invocation
#[derive(Debug, Clone)]
pub struct FindingContext {
    pub security_account_id: String,
    pub product_arn: String,
    /// Time of the event that triggered discovery
    pub observed_at: DateTime<Utc>,
    pub max_days: u32,
}

/// Human-readable reason embedding the day count and region
pub fn non_compliant_reason(days_unused: i64, region: Option<&str>) -> String {
    format!(
        "NON_COMPLIANT: Role was used {} days ago in {}",
        days_unused,
        region.unwrap_or("unknown")
    )
}

impl Finding {
    /// Build the finding for a role that has been unused for `days_unused` days.
    pub fn unused_role(
        role: &RoleRecord,
        owner_email: &str,
        days_unused: i64,
        ctx: &FindingContext,
    ) -> Self {
        Self {
            schema_version: FINDING_SCHEMA_VERSION.to_string(),
            title: format!("Unused IAM Role {} in account {}", role.name, role.account_id),
            description: non_compliant_reason(days_unused, role.last_used_region()),
            product_arn: ctx.product_arn.clone(),
            aws_account_id: ctx.security_account_id.clone(),
            id: role.arn.clone(),
            generator_id: GENERATOR_ID.to_string(),
            created_at: ctx.observed_at,
            updated_at: ctx.observed_at,
            user_defined_fields: UserDefinedFields {
                owner_email: owner_email.to_string(),
                role_name: role.name.clone(),
                target_account_id: role.account_id.clone(),
                max_days: ctx.max_days,
            },
            severity: Severity {
                label: "MEDIUM".to_string(),
            },
            resources: vec![FindingResource {
                resource_type: RESOURCE_TYPE_ROLE.to_string(),
                id: role.arn.clone(),
            }],
            types: vec![FINDING_TYPE.to_string()],
            record_state: RecordState::Active,
        }
    }

    pub fn role_arn(&self) -> &str {
        &self.id
    }

    pub fn role_name(&self) -> &str {
        &self.user_defined_fields.role_name
    }

    pub fn target_account(&self) -> &AccountId {
        &self.user_defined_fields.target_account_id
    }
}

mod u32_as_string {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u32),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s.trim().parse().map_err(de::Error::custom),
            Raw::Num(n) => Ok(n),
        }
    }
}
