//! IAM integration tests - actually call AWS APIs
//!
//! These tests are marked `#[ignore]` and only run with:
//! ```
//! AWS_PROFILE=your_profile \
//! ROLESWEEP_TEST_ACCOUNT_ID=111122223333 \
//! ROLESWEEP_TEST_CROSS_ACCOUNT_ROLE=rolesweep-audit \
//!     cargo test --test aws_iam_integration -- --ignored
//! ```
//!
//! They are read-only: roles are listed and inspected, never modified.

use chrono::Utc;
use rolesweep_common::{AccountId, Allowlist};
use rolesweep_common::tags::DENY_ALL_POLICY_NAME;
use rolesweep_lifecycle::aws::{AwsContext, AwsError, CredentialBroker, IamOperations};
use rolesweep_lifecycle::aws::iam::all_roles;
use rolesweep_lifecycle::retry::RetryPolicy;
use rolesweep_lifecycle::stages::{ScanPolicy, Verdict, evaluate};
use rolesweep_test_utils::{get_test_region, test_run_id};

fn target() -> (AccountId, String) {
    let account = std::env::var("ROLESWEEP_TEST_ACCOUNT_ID")
        .expect("ROLESWEEP_TEST_ACCOUNT_ID must name the target account");
    let role = std::env::var("ROLESWEEP_TEST_CROSS_ACCOUNT_ROLE")
        .unwrap_or_else(|_| "rolesweep-audit".to_string());
    (AccountId::parse(account).expect("valid account id"), role)
}

async fn broker() -> CredentialBroker {
    let ctx = AwsContext::new(&get_test_region(), 3).await;
    CredentialBroker::new(&ctx, 900, RetryPolicy::default())
}

/// Assume the cross-account role and walk every role in the account
#[tokio::test]
#[ignore]
async fn test_list_and_evaluate_roles() {
    let (account, role) = target();
    let creds = broker()
        .await
        .acquire(&account, &role)
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");

    assert_eq!(creds.account_id(), &account);
    assert!(creds.role_arn().ends_with(&format!(":role/{role}")));

    let iam = creds.iam_client();
    let roles = all_roles(&iam).await.expect("Should list roles");
    assert!(
        roles.iter().any(|r| r.name == role),
        "the assumed role itself should be listed"
    );

    let policy = ScanPolicy {
        allowlist: Allowlist::parse("/aws-service-role/*|/aws-reserved/*").unwrap(),
        max_days: 60,
        default_owner_email: "security@example.com".to_string(),
        grace_period_days: 30,
    };
    let now = Utc::now();
    for record in &roles {
        assert!(record.path.starts_with('/') && record.path.ends_with('/'));
        assert_eq!(record.account_id, account);
        if record.path.starts_with("/aws-service-role/") {
            assert_eq!(evaluate(record, &policy, now), Verdict::Allowlisted);
        }
    }
}

/// `get_role` agrees with the listing and a missing role maps to NotFound
#[tokio::test]
#[ignore]
async fn test_get_role_and_missing_role() {
    let (account, role) = target();
    let creds = broker()
        .await
        .acquire(&account, &role)
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");
    let iam = creds.iam_client();

    let record = iam.get_role(&role).await.expect("Should read the assumed role");
    assert_eq!(record.name, role);
    assert!(
        !iam.has_inline_policy(&role, DENY_ALL_POLICY_NAME)
            .await
            .expect("Should check for the marker policy"),
        "the cross-account role must never be deactivated"
    );

    let missing = format!("rolesweep-{}", test_run_id());
    let err = iam.get_role(&missing).await.unwrap_err();
    assert!(matches!(err, AwsError::NotFound { .. }), "got {err:?}");
}

/// Assuming a role that does not exist is reported as permission denied
#[tokio::test]
#[ignore]
async fn test_acquire_unknown_role_is_denied() {
    let (account, _) = target();
    let role = format!("rolesweep-missing-{}", test_run_id());
    let err = broker().await.acquire(&account, &role).await.unwrap_err();
    assert!(matches!(err, AwsError::PermissionDenied { .. }), "got {err:?}");
}
