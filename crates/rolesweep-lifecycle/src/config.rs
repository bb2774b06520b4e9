//! Lifecycle configuration
//!
//! One [`LifecycleConfig`] serves every stage. It is read from a JSON file
//! or assembled from command-line flags and environment variables, then
//! checked with [`LifecycleConfig::check`] before any stage does remote work.

use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use rolesweep_common::defaults::{
    default_credential_duration_secs, default_grace_period_days, default_max_attempts,
    default_max_unused_days, default_retry_max_delay_ms, default_retry_min_delay_ms,
};
use rolesweep_common::finding::FindingContext;
use rolesweep_common::tags::product_arn;
use rolesweep_common::workflow::DiscoverEvent;
use rolesweep_common::{AccountId, Allowlist, ConfigError, ScopeMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration shared by all lifecycle stages
#[derive(Debug, Clone, Serialize, Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Role assumed in every target account
    #[garde(length(min = 1, max = 64))]
    pub cross_account_role: String,

    /// Account that owns the findings store and the workflow
    #[garde(skip)]
    pub security_account_id: AccountId,

    /// Target account in single-account deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub account_id: Option<AccountId>,

    /// AWS region of the findings store and the workflow
    #[garde(length(min = 1))]
    pub region: String,

    /// Roles unused for longer than this are flagged
    #[serde(default = "default_max_unused_days")]
    #[garde(range(min = 1))]
    pub max_unused_days: u32,

    /// Pipe-delimited path+name globs exempt from evaluation
    #[serde(default)]
    #[garde(skip)]
    pub allowlist: String,

    #[serde(default)]
    #[garde(skip)]
    pub scope: ScopeMode,

    /// Required when `scope` is organizational-unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub organizational_unit_id: Option<String>,

    /// Owner address used when a role has no owner tag
    #[garde(length(min = 3), contains("@"))]
    pub default_owner_email: String,

    /// Days between deactivation and deletion
    #[serde(default = "default_grace_period_days")]
    #[garde(range(min = 1))]
    pub grace_period_days: u32,

    /// State machine started once per emitted finding
    #[garde(length(min = 1))]
    pub state_machine_arn: String,

    /// Sender address of decision requests
    #[garde(length(min = 3), contains("@"))]
    pub notification_sender: String,

    /// Base URL of the approve/deny callback endpoints
    #[garde(length(min = 1))]
    pub approval_endpoint: String,

    /// Lifetime of assumed credentials, in seconds
    #[serde(default = "default_credential_duration_secs")]
    #[garde(range(min = 900, max = 43200))]
    pub credential_duration_secs: i32,

    /// Maximum attempts for SDK and transient-error retries
    #[serde(default = "default_max_attempts")]
    #[garde(range(min = 1))]
    pub max_attempts: u32,

    #[serde(default = "default_retry_min_delay_ms")]
    #[garde(skip)]
    pub retry_min_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    #[garde(skip)]
    pub retry_max_delay_ms: u64,
}

impl LifecycleConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validate every field and compile the allowlist.
    pub fn check(&self) -> Result<Allowlist, ConfigError> {
        garde::Validate::validate(self)?;

        match self.scope {
            ScopeMode::SingleAccount if self.account_id.is_none() => {
                return Err(ConfigError::Empty("account_id"));
            }
            ScopeMode::OrganizationalUnit
                if self
                    .organizational_unit_id
                    .as_deref()
                    .is_none_or(|ou| ou.trim().is_empty()) =>
            {
                return Err(ConfigError::MissingOrganizationalUnit);
            }
            _ => {}
        }

        if self.retry_min_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::RetryDelayOrder {
                min_ms: self.retry_min_delay_ms,
                max_ms: self.retry_max_delay_ms,
            });
        }

        Allowlist::parse(&self.allowlist)
    }

    /// Account a discovery invocation scans.
    ///
    /// Single-account deployments always scan the configured account; the
    /// organizational modes take the account the producer put in the event.
    pub fn discovery_target(&self, event: &DiscoverEvent) -> Result<AccountId, ConfigError> {
        let target = match self.scope {
            ScopeMode::SingleAccount => self.account_id.as_ref(),
            ScopeMode::Organization | ScopeMode::OrganizationalUnit => event.account_id.as_ref(),
        };
        target.cloned().ok_or(ConfigError::Empty("account_id"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(self.retry_min_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    pub fn product_arn(&self) -> String {
        product_arn(&self.region, self.security_account_id.as_str())
    }

    /// Values stamped on every finding of one discovery invocation
    pub fn finding_context(&self, observed_at: DateTime<Utc>) -> FindingContext {
        FindingContext {
            security_account_id: self.security_account_id.to_string(),
            product_arn: self.product_arn(),
            observed_at,
            max_days: self.max_unused_days,
        }
    }
}
