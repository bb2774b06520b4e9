//! IAM role inspection, deactivation and teardown in a target account

use crate::aws::error::AwsError;
use crate::aws::paginate::{Page, drain_pages};
use aws_sdk_iam::Client;
use aws_sdk_iam::types::{EntityType, RoleLastUsed, Tag};
use chrono::{DateTime, Utc};
use rolesweep_common::finding::{AccountId, LastUsed, RoleRecord};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// IAM client bound to one target account
pub struct IamClient {
    client: Client,
    account_id: AccountId,
}

fn to_chrono(dt: &aws_sdk_iam::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn last_used(used: Option<&RoleLastUsed>) -> Option<LastUsed> {
    let used = used?;
    Some(LastUsed {
        at: to_chrono(used.last_used_date()?)?,
        region: used.region().map(str::to_string),
    })
}

fn tag_map(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().to_string()))
        .collect()
}

impl IamClient {
    pub fn new(client: Client, account_id: AccountId) -> Self {
        Self { client, account_id }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    fn role_from_detail(&self, detail: &aws_sdk_iam::types::RoleDetail) -> Option<RoleRecord> {
        let (Some(name), Some(arn), Some(created)) =
            (detail.role_name(), detail.arn(), detail.create_date())
        else {
            warn!(role = ?detail.role_name(), "Skipping role detail with missing fields");
            return None;
        };

        Some(RoleRecord {
            name: name.to_string(),
            path: detail.path().unwrap_or("/").to_string(),
            arn: arn.to_string(),
            account_id: self.account_id.clone(),
            created_at: to_chrono(created)?,
            last_used: last_used(detail.role_last_used()),
            tags: tag_map(detail.tags()),
        })
    }
}

/// Trait for the IAM operations the lifecycle stages need.
///
/// Listing methods return one page at a time; use the `all_*` helpers in
/// this module to drain them.
///
/// Note: Marker parameters use `Option<String>` instead of `Option<&str>` to
/// work around mockall lifetime limitations.
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait IamOperations: Send + Sync {
    /// One page of every role in the account, with tags and last-used data
    async fn list_roles_page(&self, marker: Option<String>) -> Result<Page<RoleRecord>, AwsError>;

    /// Fresh snapshot of one role
    async fn get_role(&self, role_name: &str) -> Result<RoleRecord, AwsError>;

    /// Check whether an inline policy with this name is attached
    async fn has_inline_policy(&self, role_name: &str, policy_name: &str)
    -> Result<bool, AwsError>;

    /// Create or replace an inline policy
    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), AwsError>;

    /// Create or replace a tag
    async fn tag_role(&self, role_name: &str, key: &str, value: &str) -> Result<(), AwsError>;

    /// One page of instance profile names containing the role
    async fn list_instance_profiles_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<(), AwsError>;

    /// One page of attached managed policy ARNs
    async fn list_attached_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), AwsError>;

    /// One page of inline policy names
    async fn list_inline_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError>;

    async fn delete_inline_policy(&self, role_name: &str, policy_name: &str)
    -> Result<(), AwsError>;

    async fn delete_role(&self, role_name: &str) -> Result<(), AwsError>;
}

impl IamOperations for IamClient {
    async fn list_roles_page(&self, marker: Option<String>) -> Result<Page<RoleRecord>, AwsError> {
        let resp = self
            .client
            .get_account_authorization_details()
            .filter(EntityType::Role)
            .set_marker(marker)
            .send()
            .await?;

        let roles = resp
            .role_detail_list()
            .iter()
            .filter_map(|d| self.role_from_detail(d))
            .collect();

        Ok(Page::from_response(roles, resp.is_truncated(), resp.marker()))
    }

    async fn get_role(&self, role_name: &str) -> Result<RoleRecord, AwsError> {
        let resp = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        let role = resp.role().ok_or_else(|| AwsError::NotFound {
            resource_type: "role",
            resource_id: role_name.to_string(),
        })?;

        let created_at = to_chrono(role.create_date()).ok_or_else(|| AwsError::Internal {
            code: None,
            detail: format!("role {role_name} has an unrepresentable creation date"),
        })?;

        Ok(RoleRecord {
            name: role.role_name().to_string(),
            path: role.path().to_string(),
            arn: role.arn().to_string(),
            account_id: self.account_id.clone(),
            created_at,
            last_used: last_used(role.role_last_used()),
            tags: tag_map(role.tags()),
        })
    }

    async fn has_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<bool, AwsError> {
        match self
            .client
            .get_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match AwsError::from(e) {
                err if err.is_not_found() => Ok(false),
                err => Err(err),
            },
        }
    }

    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), AwsError> {
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        debug!(role_name = %role_name, policy_name = %policy_name, "Inline policy written");
        Ok(())
    }

    async fn tag_role(&self, role_name: &str, key: &str, value: &str) -> Result<(), AwsError> {
        let tag = Tag::builder()
            .key(key)
            .value(value)
            .build()
            .map_err(|e| AwsError::Validation(format!("Failed to build IAM tag: {e}")))?;

        self.client
            .tag_role()
            .role_name(role_name)
            .tags(tag)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        debug!(role_name = %role_name, key = %key, "Role tagged");
        Ok(())
    }

    async fn list_instance_profiles_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let resp = self
            .client
            .list_instance_profiles_for_role()
            .role_name(role_name)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        let names = resp
            .instance_profiles()
            .iter()
            .map(|p| p.instance_profile_name().to_string())
            .collect();

        Ok(Page::from_response(names, resp.is_truncated(), resp.marker()))
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<(), AwsError> {
        self.client
            .remove_role_from_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("instance profile", profile_name))?;

        debug!(role_name = %role_name, profile_name = %profile_name, "Removed from instance profile");
        Ok(())
    }

    async fn list_attached_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let resp = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        let arns = resp
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn().map(str::to_string))
            .collect();

        Ok(Page::from_response(arns, resp.is_truncated(), resp.marker()))
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), AwsError> {
        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("managed policy", policy_arn))?;

        debug!(role_name = %role_name, policy_arn = %policy_arn, "Managed policy detached");
        Ok(())
    }

    async fn list_inline_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let resp = self
            .client
            .list_role_policies()
            .role_name(role_name)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;

        Ok(Page::from_response(
            resp.policy_names().to_vec(),
            resp.is_truncated(),
            resp.marker(),
        ))
    }

    async fn delete_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<(), AwsError> {
        self.client
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("inline policy", policy_name))?;

        debug!(role_name = %role_name, policy_name = %policy_name, "Inline policy deleted");
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), AwsError> {
        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| AwsError::from(e).for_resource("role", role_name))?;
        Ok(())
    }
}

/// Every role in the account, all pages drained
pub async fn all_roles<I: IamOperations>(iam: &I) -> Result<Vec<RoleRecord>, AwsError> {
    drain_pages("roles", |marker| iam.list_roles_page(marker)).await
}

/// Every instance profile containing the role, all pages drained
pub async fn all_instance_profiles<I: IamOperations>(
    iam: &I,
    role_name: &str,
) -> Result<Vec<String>, AwsError> {
    drain_pages("instance profiles", |marker| {
        iam.list_instance_profiles_page(role_name, marker)
    })
    .await
}

/// Every managed policy attached to the role, all pages drained
pub async fn all_attached_policies<I: IamOperations>(
    iam: &I,
    role_name: &str,
) -> Result<Vec<String>, AwsError> {
    drain_pages("attached policies", |marker| {
        iam.list_attached_policies_page(role_name, marker)
    })
    .await
}

/// Every inline policy of the role, all pages drained
pub async fn all_inline_policies<I: IamOperations>(
    iam: &I,
    role_name: &str,
) -> Result<Vec<String>, AwsError> {
    drain_pages("inline policies", |marker| {
        iam.list_inline_policies_page(role_name, marker)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_last_used_without_date_is_none() {
        let used = RoleLastUsed::builder().region("us-east-1").build();
        assert!(last_used(Some(&used)).is_none());
        assert!(last_used(None).is_none());
    }

    #[test]
    fn role_last_used_conversion() {
        let used = RoleLastUsed::builder()
            .last_used_date(aws_sdk_iam::primitives::DateTime::from_secs(1_772_366_400))
            .region("eu-west-1")
            .build();
        let converted = last_used(Some(&used)).unwrap();
        assert_eq!(converted.at.timestamp(), 1_772_366_400);
        assert_eq!(converted.region.as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn all_roles_drains_every_page() {
        let mut iam = MockIamOperations::new();
        iam.expect_list_roles_page()
            .withf(|marker| marker.is_none())
            .times(1)
            .returning(|_| {
                Ok(Page {
                    items: vec![],
                    marker: Some("m1".to_string()),
                })
            });
        iam.expect_list_roles_page()
            .withf(|marker| marker.as_deref() == Some("m1"))
            .times(1)
            .returning(|_| Ok(Page::last(vec![])));

        let roles = all_roles(&iam).await.unwrap();
        assert!(roles.is_empty());
    }
}
