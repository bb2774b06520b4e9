//! Security Hub finding store

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::error::AwsError;
use crate::retry::{RetryPolicy, retry_transient};
use aws_sdk_securityhub::Client;
use aws_sdk_securityhub::types::{
    AwsSecurityFinding, AwsSecurityFindingFilters, Resource, Severity, SeverityLabel,
    StringFilter, StringFilterComparison,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rolesweep_common::defaults::MAX_IMPORT_BATCH;
use rolesweep_common::finding::Finding;
use tracing::{debug, info, warn};

/// A finding the store refused to import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub id: String,
    pub code: String,
    pub message: String,
}

/// Trait for the finding store operations discovery needs
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait FindingStore: Send + Sync {
    /// Check whether an ACTIVE finding exists for (product, role ARN)
    async fn has_active_finding(&self, product_arn: &str, role_arn: &str)
    -> Result<bool, AwsError>;

    /// Import one batch of at most [`MAX_IMPORT_BATCH`] findings.
    ///
    /// Returns the per-finding failures reported by the store.
    async fn import_batch(&self, findings: &[Finding]) -> Result<Vec<ImportFailure>, AwsError>;
}

/// Security Hub client in the security account
pub struct SecurityHubStore {
    client: Client,
}

impl FromAwsContext for SecurityHubStore {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.securityhub_client(),
        }
    }
}

fn equals(value: &str) -> StringFilter {
    StringFilter::builder()
        .value(value)
        .comparison(StringFilterComparison::Equals)
        .build()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert a finding into the Security Hub wire type.
fn to_aws_finding(finding: &Finding) -> AwsSecurityFinding {
    let resources = finding
        .resources
        .iter()
        .map(|r| Resource::builder().r#type(&r.resource_type).id(&r.id).build())
        .collect();

    let fields = &finding.user_defined_fields;

    AwsSecurityFinding::builder()
        .schema_version(&finding.schema_version)
        .id(&finding.id)
        .product_arn(&finding.product_arn)
        .generator_id(&finding.generator_id)
        .aws_account_id(&finding.aws_account_id)
        .set_types(Some(finding.types.clone()))
        .created_at(timestamp(finding.created_at))
        .updated_at(timestamp(finding.updated_at))
        .severity(
            Severity::builder()
                .label(SeverityLabel::from(finding.severity.label.as_str()))
                .build(),
        )
        .title(&finding.title)
        .description(&finding.description)
        .set_resources(Some(resources))
        .user_defined_fields("OwnerEmail", &fields.owner_email)
        .user_defined_fields("RoleName", &fields.role_name)
        .user_defined_fields("TargetAccountId", fields.target_account_id.as_str())
        .user_defined_fields("MaxDays", fields.max_days.to_string())
        .record_state(aws_sdk_securityhub::types::RecordState::from(
            finding.record_state.as_ref(),
        ))
        .build()
}

impl FindingStore for SecurityHubStore {
    async fn has_active_finding(
        &self,
        product_arn: &str,
        role_arn: &str,
    ) -> Result<bool, AwsError> {
        let filters = AwsSecurityFindingFilters::builder()
            .product_arn(equals(product_arn))
            .id(equals(role_arn))
            .record_state(equals("ACTIVE"))
            .build();

        let resp = self
            .client
            .get_findings()
            .filters(filters)
            .max_results(1)
            .send()
            .await?;

        let found = !resp.findings().is_empty();
        debug!(role_arn = %role_arn, found, "Checked for active finding");
        Ok(found)
    }

    async fn import_batch(&self, findings: &[Finding]) -> Result<Vec<ImportFailure>, AwsError> {
        let batch = findings.iter().map(to_aws_finding).collect();

        let resp = self
            .client
            .batch_import_findings()
            .set_findings(Some(batch))
            .send()
            .await?;

        Ok(resp
            .failed_findings()
            .iter()
            .map(|f| ImportFailure {
                id: f.id().unwrap_or_default().to_string(),
                code: f.error_code().unwrap_or_default().to_string(),
                message: f.error_message().unwrap_or_default().to_string(),
            })
            .collect())
    }
}

/// Import findings in sequential batches of at most [`MAX_IMPORT_BATCH`].
///
/// Throttled batches are retried under `retry`. Findings the store rejects
/// are logged and returned; any other error aborts the remaining batches.
///
/// # Returns
/// The findings that failed to import, across all batches
pub async fn report_findings<S: FindingStore>(
    store: &S,
    findings: &[Finding],
    retry: &RetryPolicy,
) -> Result<Vec<ImportFailure>, AwsError> {
    let mut failed = Vec::new();

    for (index, batch) in findings.chunks(MAX_IMPORT_BATCH).enumerate() {
        let failures = retry_transient(retry, "securityhub:BatchImportFindings", || {
            store.import_batch(batch)
        })
        .await?;

        for failure in &failures {
            warn!(
                finding_id = %failure.id,
                code = %failure.code,
                message = %failure.message,
                "Finding import failed"
            );
        }

        debug!(batch = index, size = batch.len(), failed = failures.len(), "Imported finding batch");
        failed.extend(failures);
    }

    if !findings.is_empty() {
        info!(total = findings.len(), failed = failed.len(), "Findings reported");
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesweep_common::finding::FindingContext;
    use rolesweep_common::tags::product_arn;
    use rolesweep_test_utils::RoleRecordBuilder;

    fn findings(count: usize) -> Vec<Finding> {
        let ctx = FindingContext {
            security_account_id: "999988887777".to_string(),
            product_arn: product_arn("us-west-2", "999988887777"),
            observed_at: Utc::now(),
            max_days: 60,
        };
        (0..count)
            .map(|i| {
                let role = RoleRecordBuilder::new(&format!("role-{i}"))
                    .last_used_days_ago(75, "us-east-1")
                    .build();
                Finding::unused_role(&role, "owner@example.com", 75, &ctx)
            })
            .collect()
    }

    #[test]
    fn converts_to_wire_finding() {
        let finding = &findings(1)[0];
        let aws = to_aws_finding(finding);

        assert_eq!(aws.id(), Some(finding.id.as_str()));
        assert_eq!(aws.types(), [finding.types[0].clone()]);
        assert_eq!(aws.resources()[0].r#type(), Some("AwsIamRoleDetails"));
        assert_eq!(
            aws.severity().and_then(|s| s.label()),
            Some(&SeverityLabel::Medium)
        );
        let fields = aws.user_defined_fields().unwrap();
        assert_eq!(fields.get("MaxDays").map(String::as_str), Some("60"));
        assert_eq!(fields.get("RoleName").map(String::as_str), Some("role-0"));
        assert!(aws.created_at().is_some_and(|at| at.ends_with('Z')));
    }

    #[tokio::test]
    async fn reports_in_batches_of_at_most_100() {
        let mut store = MockFindingStore::new();
        store
            .expect_import_batch()
            .withf(|batch| batch.len() == 100)
            .times(2)
            .returning(|_| Ok(vec![]));
        store
            .expect_import_batch()
            .withf(|batch| batch.len() == 50)
            .times(1)
            .returning(|batch| {
                Ok(vec![ImportFailure {
                    id: batch[0].id.clone(),
                    code: "InvalidInput".to_string(),
                    message: "bad".to_string(),
                }])
            });

        let all = findings(250);
        let failed = report_findings(&store, &all, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, all[200].id);
    }

    #[tokio::test]
    async fn empty_report_makes_no_calls() {
        let mut store = MockFindingStore::new();
        store.expect_import_batch().never();
        let failed = report_findings(&store, &[], &RetryPolicy::none())
            .await
            .unwrap();
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn import_error_aborts_remaining_batches() {
        let mut store = MockFindingStore::new();
        store
            .expect_import_batch()
            .times(1)
            .returning(|_| Err(AwsError::Validation("rejected".to_string())));

        let result = report_findings(&store, &findings(150), &RetryPolicy::none()).await;
        assert!(matches!(result, Err(AwsError::Validation(_))));
    }
}
