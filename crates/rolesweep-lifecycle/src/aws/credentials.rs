//! Cross-account credential acquisition
//!
//! Every stage works inside exactly one target account. It assumes the
//! fixed cross-account role in that account, builds fresh clients from the
//! resulting short-lived credentials, and drops them when the invocation
//! ends.

use crate::aws::context::AwsContext;
use crate::aws::error::AwsError;
use crate::aws::iam::IamClient;
use crate::retry::{RetryPolicy, retry_transient};
use aws_config::SdkConfig;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use rolesweep_common::finding::AccountId;
use rolesweep_common::tags::role_arn;
use std::time::SystemTime;
use tracing::{debug, error, info};

/// Credentials valid in a single account for a single role
pub struct ScopedCredentials {
    account_id: AccountId,
    role_arn: String,
    expires_at: Option<SystemTime>,
    config: SdkConfig,
}

impl ScopedCredentials {
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Create an IAM client operating in the target account.
    pub fn iam_client(&self) -> IamClient {
        IamClient::new(aws_sdk_iam::Client::new(&self.config), self.account_id.clone())
    }
}

impl std::fmt::Debug for ScopedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCredentials")
            .field("account_id", &self.account_id)
            .field("role_arn", &self.role_arn)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Exchanges the cross-account role name for temporary credentials.
pub struct CredentialBroker {
    ctx: AwsContext,
    sts: aws_sdk_sts::Client,
    duration_secs: i32,
    retry: RetryPolicy,
}

impl CredentialBroker {
    pub fn new(ctx: &AwsContext, duration_secs: i32, retry: RetryPolicy) -> Self {
        Self {
            ctx: ctx.clone(),
            sts: ctx.sts_client(),
            duration_secs,
            retry,
        }
    }

    /// Assume `cross_account_role` in `account_id`.
    ///
    /// Fails with `PermissionDenied` when the role may not be assumed, and
    /// with a normalized `Internal` error for any other remote failure.
    pub async fn acquire(
        &self,
        account_id: &AccountId,
        cross_account_role: &str,
    ) -> Result<ScopedCredentials, AwsError> {
        let arn = role_arn(account_id, cross_account_role);
        debug!(role_arn = %arn, "Assuming cross-account role");

        let response = retry_transient(&self.retry, "sts:AssumeRole", || async {
            self.sts
                .assume_role()
                .role_arn(&arn)
                .role_session_name(cross_account_role)
                .duration_seconds(self.duration_secs)
                .send()
                .await
                .map_err(AwsError::from)
        })
        .await
        .map_err(|e| normalize_assume_error(e, &arn))?;

        let creds = response.credentials().ok_or_else(|| AwsError::Internal {
            code: None,
            detail: format!("AssumeRole for {arn} returned no credentials"),
        })?;

        let expires_at = SystemTime::try_from(*creds.expiration()).ok();
        let provider = SharedCredentialsProvider::new(Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_string()),
            expires_at,
            "rolesweep-assume-role",
        ));

        info!(account_id = %account_id, role_arn = %arn, "Acquired scoped credentials");

        Ok(ScopedCredentials {
            account_id: account_id.clone(),
            role_arn: arn,
            expires_at,
            config: self.ctx.with_credentials(provider),
        })
    }
}

/// Map an AssumeRole failure onto the broker's two failure kinds.
fn normalize_assume_error(err: AwsError, arn: &str) -> AwsError {
    match err {
        AwsError::PermissionDenied { .. } => AwsError::PermissionDenied {
            role_arn: arn.to_string(),
        },
        AwsError::Internal { code, detail } => {
            error!(role_arn = %arn, code = ?code, detail = %detail, "AssumeRole failed");
            AwsError::Internal { code, detail }
        }
        other => {
            error!(role_arn = %arn, error = ?other, "AssumeRole failed");
            AwsError::Internal {
                code: Some(error_kind(&other).to_string()),
                detail: other.to_string(),
            }
        }
    }
}

fn error_kind(err: &AwsError) -> &'static str {
    match err {
        AwsError::PermissionDenied { .. } => "PermissionDenied",
        AwsError::NotFound { .. } => "NotFound",
        AwsError::AlreadyExists => "AlreadyExists",
        AwsError::Throttled => "Throttled",
        AwsError::Validation(_) => "Validation",
        AwsError::Internal { .. } => "Internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::error::classify_aws_error;

    const ARN: &str = "arn:aws:iam::111122223333:role/rolesweep-audit";

    #[test]
    fn access_denied_names_the_role() {
        let err = classify_aws_error(Some("AccessDenied"), Some("User is not authorized"));
        let err = normalize_assume_error(err, ARN);

        assert!(err.is_permission_denied());
        assert_eq!(
            err.to_string(),
            format!("rolesweep does not have permission to assume the IAM role {ARN}")
        );
    }

    #[test]
    fn other_errors_are_normalized() {
        let err = classify_aws_error(Some("RegionDisabledException"), Some("STS disabled"));
        let err = normalize_assume_error(err, ARN);

        assert_eq!(err.to_string(), "InternalError");
        assert_eq!(err.code(), Some("RegionDisabledException"));
    }

    #[test]
    fn exhausted_throttling_is_normalized() {
        let err = normalize_assume_error(AwsError::Throttled, ARN);
        assert_eq!(err.to_string(), "InternalError");
        assert_eq!(err.code(), Some("Throttled"));
    }
}
