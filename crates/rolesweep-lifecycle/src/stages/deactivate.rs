//! Role deactivation
//!
//! A role is deactivated by writing the deny-all inline policy and then the
//! deactivation tag. Both writes are upserts, so redelivering the stage
//! re-applies them without error.

use crate::aws::error::AwsError;
use crate::aws::iam::IamOperations;
use chrono::{DateTime, Utc};
use rolesweep_common::tags::{
    DEACTIVATE_REASON, DENY_ALL_POLICY_DOCUMENT, DENY_ALL_POLICY_NAME, TAG_DEACTIVATE_REASON,
};
use rolesweep_common::workflow::{DeactivateEvent, DeactivationOutcome, grace_deadline};
use tracing::{info, warn};

/// Attach the deny-all marker policy, then the deactivation tag.
///
/// The tag is only written once the policy is in place. Either failure is
/// returned to the caller so the stage can be retried.
pub async fn deactivate<I: IamOperations>(iam: &I, role_name: &str) -> Result<(), AwsError> {
    iam.put_inline_policy(role_name, DENY_ALL_POLICY_NAME, DENY_ALL_POLICY_DOCUMENT)
        .await
        .inspect_err(|e| {
            warn!(role_name = %role_name, error = %e, code = ?e.code(), "Failed to attach deny-all policy");
        })?;

    iam.tag_role(role_name, TAG_DEACTIVATE_REASON, DEACTIVATE_REASON)
        .await?;

    info!(role_name = %role_name, "Role deactivated");
    Ok(())
}

/// Run the deactivation stage for one role.
///
/// The role is re-read first and only deactivated if it is still unused
/// beyond `max_days`. A role that has disappeared fails the stage.
pub async fn run_deactivation<I: IamOperations>(
    iam: &I,
    event: &DeactivateEvent,
    now: DateTime<Utc>,
    grace_period_days: u32,
) -> Result<DeactivationOutcome, AwsError> {
    let role = iam.get_role(&event.role_name).await?;

    let role_status = match role.days_since_last_use(now) {
        Some(days_unused) if days_unused > i64::from(event.max_days) => {
            deactivate(iam, &role.name).await?;
            true
        }
        Some(days_unused) => {
            info!(
                role_name = %role.name,
                account_id = %event.target_account_id,
                days_unused,
                region = ?role.last_used_region(),
                "Role is in use, not deactivating"
            );
            false
        }
        None => {
            info!(role_name = %role.name, "Role has no last-used information, not deactivating");
            false
        }
    };

    Ok(DeactivationOutcome {
        role_name: role.name,
        account_id: event.target_account_id.clone(),
        max_days: event.max_days,
        wait_until: event
            .wait_until
            .unwrap_or_else(|| grace_deadline(now, grace_period_days)),
        role_status,
    })
}
