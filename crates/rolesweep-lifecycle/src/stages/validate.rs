//! Final validation and deletion
//!
//! After the grace period the role is read again. It is deleted only if it
//! is still unused beyond the threshold and still carries the deny-all
//! marker. Teardown order is fixed. First the role leaves every instance
//! profile, then managed policies are detached, then inline policies are
//! deleted, and finally the role itself. Each listing is drained before
//! its removals begin.

use crate::aws::error::{AwsError, ignore_not_found};
use crate::aws::iam::{
    IamOperations, all_attached_policies, all_inline_policies, all_instance_profiles,
};
use chrono::{DateTime, Utc};
use rolesweep_common::LifecycleEvent;
use rolesweep_common::tags::DENY_ALL_POLICY_NAME;
use rolesweep_common::workflow::ValidateEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Deleted,
    /// The role was gone before or during teardown
    AlreadyDeleted,
    InUse,
    NoUsageData,
    /// Unused, but the deny-all marker is missing
    NotDeactivated,
}

impl ValidationStatus {
    /// Lifecycle event the driver records for this status
    pub fn event(self) -> LifecycleEvent {
        match self {
            Self::Deleted | Self::AlreadyDeleted => LifecycleEvent::Deleted,
            Self::InUse | Self::NoUsageData | Self::NotDeactivated => LifecycleEvent::Retained,
        }
    }
}

/// Returned to the driver at the end of the lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub role_name: String,
    pub account_id: String,
    pub status: ValidationStatus,
    pub message: String,
}

impl ValidationOutcome {
    fn new(event: &ValidateEvent, status: ValidationStatus, message: String) -> Self {
        Self {
            role_name: event.role_name.clone(),
            account_id: event.account_id.to_string(),
            status,
            message,
        }
    }

    fn deleted(event: &ValidateEvent) -> Self {
        Self::new(event, ValidationStatus::Deleted, "Role is deleted".to_string())
    }

    fn already_deleted(event: &ValidateEvent) -> Self {
        Self::new(
            event,
            ValidationStatus::AlreadyDeleted,
            format!(
                "Role {} in account {} no longer exists",
                event.role_name, event.account_id
            ),
        )
    }
}

/// Re-check the role and delete it if it is still unused and deactivated.
pub async fn validate_and_delete<I: IamOperations>(
    iam: &I,
    event: &ValidateEvent,
    now: DateTime<Utc>,
) -> Result<ValidationOutcome, AwsError> {
    let role = match iam.get_role(&event.role_name).await {
        Ok(role) => role,
        Err(e) if e.is_not_found() => {
            info!(role_name = %event.role_name, "Role already deleted");
            return Ok(ValidationOutcome::already_deleted(event));
        }
        Err(e) => return Err(e),
    };

    let Some(days_unused) = role.days_since_last_use(now) else {
        return Ok(ValidationOutcome::new(
            event,
            ValidationStatus::NoUsageData,
            format!(
                "Role {} in account {} has no last-used information",
                role.name, event.account_id
            ),
        ));
    };

    if days_unused <= i64::from(event.max_days) {
        info!(role_name = %role.name, days_unused, "Role is in use, not deleting");
        return Ok(ValidationOutcome::new(
            event,
            ValidationStatus::InUse,
            format!(
                "Role is in use. Role {} in account {} was used {} days ago in {}",
                role.name,
                event.account_id,
                days_unused,
                role.last_used_region().unwrap_or("unknown")
            ),
        ));
    }

    if !iam.has_inline_policy(&role.name, DENY_ALL_POLICY_NAME).await? {
        warn!(role_name = %role.name, "Deny-all marker missing, not deleting");
        return Ok(ValidationOutcome::new(
            event,
            ValidationStatus::NotDeactivated,
            format!(
                "Role {} in account {} is not deactivated, not deleting",
                role.name, event.account_id
            ),
        ));
    }

    info!(role_name = %role.name, account_id = %event.account_id, "Deleting role");
    match teardown(iam, &role.name).await {
        Ok(()) => Ok(ValidationOutcome::deleted(event)),
        Err(e) if e.is_not_found() => Ok(ValidationOutcome::already_deleted(event)),
        Err(e) => Err(e),
    }
}

/// Remove every attachment of a role, then the role.
///
/// Attachments that vanish between listing and removal are skipped. A
/// `NotFound` from a listing or from the final delete means the role itself
/// is gone and is returned to the caller.
async fn teardown<I: IamOperations>(iam: &I, role_name: &str) -> Result<(), AwsError> {
    let profiles = all_instance_profiles(iam, role_name).await?;
    for profile in &profiles {
        ignore_not_found(iam.remove_role_from_instance_profile(profile, role_name).await)?;
    }

    let managed = all_attached_policies(iam, role_name).await?;
    for arn in &managed {
        ignore_not_found(iam.detach_role_policy(role_name, arn).await)?;
    }

    let inline = all_inline_policies(iam, role_name).await?;
    for name in &inline {
        ignore_not_found(iam.delete_inline_policy(role_name, name).await)?;
    }

    iam.delete_role(role_name).await?;

    info!(
        role_name = %role_name,
        instance_profiles = profiles.len(),
        managed_policies = managed.len(),
        inline_policies = inline.len(),
        "Role deleted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::iam::MockIamOperations;
    use crate::aws::paginate::Page;
    use mockall::Sequence;
    use rolesweep_common::AccountId;
    use rolesweep_test_utils::RoleRecordBuilder;

    fn event() -> ValidateEvent {
        ValidateEvent {
            account_id: AccountId::parse("111122223333").unwrap(),
            role_name: "R1".to_string(),
            max_days: 60,
        }
    }

    fn not_found() -> AwsError {
        AwsError::NotFound {
            resource_type: "role",
            resource_id: "R1".to_string(),
        }
    }

    fn unused_role(iam: &mut MockIamOperations, now: DateTime<Utc>) {
        let role = RoleRecordBuilder::new("R1")
            .now(now)
            .last_used_days_ago(106, "us-east-1")
            .build();
        iam.expect_get_role().returning(move |_| Ok(role.clone()));
    }

    #[tokio::test]
    async fn teardown_runs_in_order() {
        let now = Utc::now();
        let mut seq = Sequence::new();
        let mut iam = MockIamOperations::new();
        unused_role(&mut iam, now);
        iam.expect_has_inline_policy().returning(|_, _| Ok(true));

        iam.expect_list_instance_profiles_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Page::last(vec!["profile-a".to_string()])));
        iam.expect_remove_role_from_instance_profile()
            .withf(|profile, role| profile == "profile-a" && role == "R1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        iam.expect_list_attached_policies_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Page::last(vec!["arn:aws:iam::aws:policy/ReadOnly".to_string()])));
        iam.expect_detach_role_policy()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        iam.expect_list_inline_policies_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Page::last(vec![DENY_ALL_POLICY_NAME.to_string()])));
        iam.expect_delete_inline_policy()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        iam.expect_delete_role()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let outcome = validate_and_delete(&iam, &event(), now).await.unwrap();
        assert_eq!(outcome.status, ValidationStatus::Deleted);
        assert_eq!(outcome.message, "Role is deleted");
        assert_eq!(outcome.status.event(), LifecycleEvent::Deleted);
    }

    #[tokio::test]
    async fn missing_marker_never_deletes() {
        let now = Utc::now();
        let mut iam = MockIamOperations::new();
        unused_role(&mut iam, now);
        iam.expect_has_inline_policy().returning(|_, _| Ok(false));
        iam.expect_list_instance_profiles_page().never();
        iam.expect_delete_role().never();

        let outcome = validate_and_delete(&iam, &event(), now).await.unwrap();
        assert_eq!(outcome.status, ValidationStatus::NotDeactivated);
        assert_eq!(outcome.status.event(), LifecycleEvent::Retained);
    }

    #[tokio::test]
    async fn gone_role_is_terminal_success() {
        let mut iam = MockIamOperations::new();
        iam.expect_get_role().returning(|_| Err(not_found()));
        iam.expect_delete_role().never();

        let outcome = validate_and_delete(&iam, &event(), Utc::now()).await.unwrap();
        assert_eq!(outcome.status, ValidationStatus::AlreadyDeleted);
        assert_eq!(outcome.status.event(), LifecycleEvent::Deleted);
    }

    #[tokio::test]
    async fn role_deleted_mid_teardown_is_success() {
        let now = Utc::now();
        let mut iam = MockIamOperations::new();
        unused_role(&mut iam, now);
        iam.expect_has_inline_policy().returning(|_, _| Ok(true));
        iam.expect_list_instance_profiles_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_list_attached_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_list_inline_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_delete_role().returning(|_| Err(not_found()));

        let outcome = validate_and_delete(&iam, &event(), now).await.unwrap();
        assert_eq!(outcome.status, ValidationStatus::AlreadyDeleted);
    }

    #[tokio::test]
    async fn vanished_attachment_is_skipped() {
        let now = Utc::now();
        let mut iam = MockIamOperations::new();
        unused_role(&mut iam, now);
        iam.expect_has_inline_policy().returning(|_, _| Ok(true));
        iam.expect_list_instance_profiles_page()
            .returning(|_, _| Ok(Page::last(vec!["gone".to_string()])));
        iam.expect_remove_role_from_instance_profile()
            .returning(|profile, _| {
                Err(AwsError::NotFound {
                    resource_type: "instance profile",
                    resource_id: profile.to_string(),
                })
            });
        iam.expect_list_attached_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_list_inline_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_delete_role().times(1).returning(|_| Ok(()));

        let outcome = validate_and_delete(&iam, &event(), now).await.unwrap();
        assert_eq!(outcome.status, ValidationStatus::Deleted);
    }

    #[tokio::test]
    async fn delete_failure_is_surfaced() {
        let now = Utc::now();
        let mut iam = MockIamOperations::new();
        unused_role(&mut iam, now);
        iam.expect_has_inline_policy().returning(|_, _| Ok(true));
        iam.expect_list_instance_profiles_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_list_attached_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_list_inline_policies_page()
            .returning(|_, _| Ok(Page::last(vec![])));
        iam.expect_delete_role().returning(|_| {
            Err(AwsError::Internal {
                code: Some("DeleteConflict".to_string()),
                detail: "attachments remain".to_string(),
            })
        });

        let result = validate_and_delete(&iam, &event(), now).await;
        assert!(matches!(result, Err(AwsError::Internal { .. })));
    }
}
