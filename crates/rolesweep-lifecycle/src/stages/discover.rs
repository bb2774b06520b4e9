//! Compliance scan of one target account
//!
//! The scan lists every role before evaluating any of them. Each role then
//! goes through the allowlist, age, and last-used checks, in that order. A
//! role that fails all three is checked against the finding store. Only
//! roles with no ACTIVE finding produce a new finding. The findings are
//! imported first, and a workflow execution is started only for each
//! finding the store accepted. A rejected finding has no execution and is
//! emitted again by the next scan.

use crate::aws::error::AwsError;
use crate::aws::executions::ExecutionStarter;
use crate::aws::findings::{FindingStore, report_findings};
use crate::aws::iam::{IamOperations, all_roles};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use rolesweep_common::execution_name::execution_name;
use rolesweep_common::finding::{Finding, FindingContext, RoleRecord};
use rolesweep_common::workflow::{ExecutionInput, WorkflowState};
use rolesweep_common::{AccountId, Allowlist};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Evaluation settings for one scan
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    pub allowlist: Allowlist,
    pub max_days: u32,
    pub default_owner_email: String,
    pub grace_period_days: u32,
}

/// Outcome of evaluating one role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowlisted,
    /// Created within the threshold
    TooYoung,
    /// No last-used record; unused status cannot be determined
    NoUsageData,
    Compliant { days_unused: i64 },
    Unused { days_unused: i64 },
}

/// Counters returned to the driver after a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub account_id: String,
    pub roles_scanned: usize,
    pub allowlisted: usize,
    pub too_young: usize,
    pub no_usage_data: usize,
    pub compliant: usize,
    /// Unused roles that already have an ACTIVE finding
    pub suppressed: usize,
    pub emitted: usize,
    pub executions_started: usize,
    pub import_failures: usize,
}

impl DiscoveryReport {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Allowlisted => self.allowlisted += 1,
            Verdict::TooYoung => self.too_young += 1,
            Verdict::NoUsageData => self.no_usage_data += 1,
            Verdict::Compliant { .. } => self.compliant += 1,
            Verdict::Unused { .. } => {}
        }
    }
}

/// Evaluate a role against the policy without any remote calls.
pub fn evaluate(role: &RoleRecord, policy: &ScanPolicy, now: DateTime<Utc>) -> Verdict {
    let max_days = i64::from(policy.max_days);

    if policy.allowlist.is_allowed(&role.path_name()) {
        return Verdict::Allowlisted;
    }
    if role.age_days(now) <= max_days {
        return Verdict::TooYoung;
    }
    match role.days_since_last_use(now) {
        None => Verdict::NoUsageData,
        Some(days_unused) if days_unused > max_days => Verdict::Unused { days_unused },
        Some(days_unused) => Verdict::Compliant { days_unused },
    }
}

/// Workflow and store collaborators of a scan
pub struct Discovery<'a, I, S, E> {
    pub iam: &'a I,
    pub store: &'a S,
    pub executions: &'a E,
    pub retry: &'a RetryPolicy,
}

impl<I, S, E> Discovery<'_, I, S, E>
where
    I: IamOperations,
    S: FindingStore,
    E: ExecutionStarter,
{
    /// Scan `account_id` and emit findings for newly unused roles.
    ///
    /// `ctx.observed_at` stamps the findings and names the executions, so a
    /// retried invocation for the same trigger reuses the same execution
    /// names.
    pub async fn run(
        &self,
        account_id: &AccountId,
        policy: &ScanPolicy,
        ctx: &FindingContext,
        now: DateTime<Utc>,
    ) -> Result<DiscoveryReport, AwsError> {
        let roles = all_roles(self.iam).await?;
        let mut report = DiscoveryReport {
            account_id: account_id.to_string(),
            roles_scanned: roles.len(),
            ..Default::default()
        };

        info!(account_id = %account_id, roles = roles.len(), "Evaluating roles");

        let mut findings = Vec::new();
        for role in &roles {
            let verdict = evaluate(role, policy, now);
            report.record(verdict);

            let Verdict::Unused { days_unused } = verdict else {
                debug!(role_name = %role.name, verdict = ?verdict, "Role skipped");
                continue;
            };

            if self
                .store
                .has_active_finding(&ctx.product_arn, &role.arn)
                .await?
            {
                debug!(role_name = %role.name, "Active finding exists, suppressing");
                report.suppressed += 1;
                continue;
            }

            let owner = role.owner_or(&policy.default_owner_email);
            let finding = Finding::unused_role(role, owner, days_unused, ctx);
            info!(
                role_name = %role.name,
                account_id = %account_id,
                days_unused,
                owner = %owner,
                "Unused role found"
            );

            findings.push(finding);
        }

        report.emitted = findings.len();
        let failures = report_findings(self.store, &findings, self.retry).await?;
        report.import_failures = failures.len();

        let rejected: HashSet<&str> = failures.iter().map(|f| f.id.as_str()).collect();
        for finding in findings.iter().filter(|f| !rejected.contains(f.id.as_str())) {
            self.start_workflow(finding, policy, ctx).await?;
            report.executions_started += 1;
        }

        info!(
            account_id = %account_id,
            scanned = report.roles_scanned,
            emitted = report.emitted,
            started = report.executions_started,
            suppressed = report.suppressed,
            "Discovery complete"
        );
        Ok(report)
    }

    async fn start_workflow(
        &self,
        finding: &Finding,
        policy: &ScanPolicy,
        ctx: &FindingContext,
    ) -> Result<(), AwsError> {
        let state = WorkflowState::at_emission(ctx.observed_at, policy.grace_period_days);
        let input = ExecutionInput {
            finding: finding.clone(),
            wait_until: state.wait_until,
        };
        let input = serde_json::to_string(&input).map_err(|e| AwsError::Internal {
            code: None,
            detail: format!("Failed to encode execution input: {e}"),
        })?;

        let name = execution_name(
            finding.target_account().as_str(),
            finding.role_name(),
            &finding.id,
            ctx.observed_at,
        );
        self.executions.start_execution(&name, &input).await
    }
}
