//! In-memory fakes of the AWS collaborators for multi-stage tests.
//!
//! Unlike the mockall mocks, these keep state across calls, so a test can
//! run discovery, deactivation and validation against the same account and
//! inspect what happened. Every fake records a call log.

use crate::aws::error::AwsError;
use crate::aws::executions::ExecutionStarter;
use crate::aws::findings::{FindingStore, ImportFailure};
use crate::aws::iam::IamOperations;
use crate::aws::notify::{DecisionRequest, Notifier};
use crate::aws::paginate::Page;
use chrono::{DateTime, Utc};
use rolesweep_common::RecordState;
use rolesweep_common::finding::{Finding, LastUsed, RoleRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

fn not_found(resource_type: &'static str, id: &str) -> AwsError {
    AwsError::NotFound {
        resource_type,
        resource_id: id.to_string(),
    }
}

fn injected(operation: &str) -> AwsError {
    AwsError::Internal {
        code: Some("InjectedFailure".to_string()),
        detail: format!("injected failure in {operation}"),
    }
}

fn page<T: Clone>(items: &[T], marker: Option<String>, page_size: usize) -> Page<T> {
    let start = marker.and_then(|m| m.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start.min(end)..end].to_vec(),
        marker: (end < items.len()).then(|| end.to_string()),
    }
}

/// One role and its attachments
#[derive(Debug, Clone)]
pub struct FakeRole {
    pub record: RoleRecord,
    pub inline_policies: BTreeMap<String, String>,
    pub managed_policies: Vec<String>,
    pub instance_profiles: Vec<String>,
}

impl From<RoleRecord> for FakeRole {
    fn from(record: RoleRecord) -> Self {
        Self {
            record,
            inline_policies: BTreeMap::new(),
            managed_policies: Vec::new(),
            instance_profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct AccountState {
    roles: BTreeMap<String, FakeRole>,
    failing: HashMap<String, AwsError>,
    calls: Vec<String>,
}

/// A single IAM account.
///
/// Listings are paginated with a small page size so multi-page drains are
/// exercised. `delete_role` refuses to delete a role that still has
/// attachments, the way IAM reports `DeleteConflict`.
#[derive(Debug)]
pub struct FakeIamAccount {
    state: Mutex<AccountState>,
    page_size: usize,
}

impl Default for FakeIamAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIamAccount {
    pub fn new() -> Self {
        Self::with_page_size(2)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(AccountState::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AccountState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, operation: &str, target: &str) -> Result<MutexGuard<'_, AccountState>, AwsError> {
        let mut state = self.lock();
        state.calls.push(format!("{operation} {target}"));
        if let Some(err) = state.failing.get(operation) {
            return Err(err.clone());
        }
        Ok(state)
    }

    pub fn add_role(&self, role: impl Into<FakeRole>) {
        let role = role.into();
        self.lock().roles.insert(role.record.name.clone(), role);
    }

    /// Mark a role as used at `at`
    pub fn touch(&self, role_name: &str, at: DateTime<Utc>, region: &str) {
        if let Some(role) = self.lock().roles.get_mut(role_name) {
            role.record.last_used = Some(LastUsed {
                at,
                region: Some(region.to_string()),
            });
        }
    }

    /// Make every call to `operation` fail with an internal error
    pub fn fail(&self, operation: &str) {
        self.fail_with(operation, injected(operation));
    }

    /// Make every call to `operation` fail with `err`
    pub fn fail_with(&self, operation: &str, err: AwsError) {
        self.lock().failing.insert(operation.to_string(), err);
    }

    pub fn heal(&self, operation: &str) {
        self.lock().failing.remove(operation);
    }

    pub fn role(&self, role_name: &str) -> Option<FakeRole> {
        self.lock().roles.get(role_name).cloned()
    }

    pub fn has_role(&self, role_name: &str) -> bool {
        self.lock().roles.contains_key(role_name)
    }

    /// Calls made so far, as `"operation target"` strings
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls of one operation only
    pub fn calls_of(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation} ");
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

impl IamOperations for FakeIamAccount {
    async fn list_roles_page(&self, marker: Option<String>) -> Result<Page<RoleRecord>, AwsError> {
        let state = self.enter("list_roles", marker.as_deref().unwrap_or("-"))?;
        let roles: Vec<RoleRecord> = state.roles.values().map(|r| r.record.clone()).collect();
        Ok(page(&roles, marker, self.page_size))
    }

    async fn get_role(&self, role_name: &str) -> Result<RoleRecord, AwsError> {
        let state = self.enter("get_role", role_name)?;
        state
            .roles
            .get(role_name)
            .map(|r| r.record.clone())
            .ok_or_else(|| not_found("role", role_name))
    }

    async fn has_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<bool, AwsError> {
        let state = self.enter("get_role_policy", role_name)?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        Ok(role.inline_policies.contains_key(policy_name))
    }

    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<(), AwsError> {
        let mut state = self.enter("put_role_policy", role_name)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        role.inline_policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn tag_role(&self, role_name: &str, key: &str, value: &str) -> Result<(), AwsError> {
        let mut state = self.enter("tag_role", role_name)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        role.record.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_instance_profiles_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let state = self.enter("list_instance_profiles", role_name)?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        Ok(page(&role.instance_profiles, marker, self.page_size))
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> Result<(), AwsError> {
        let mut state = self.enter("remove_role_from_instance_profile", profile_name)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        let before = role.instance_profiles.len();
        role.instance_profiles.retain(|p| p != profile_name);
        if role.instance_profiles.len() == before {
            return Err(not_found("instance profile", profile_name));
        }
        Ok(())
    }

    async fn list_attached_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let state = self.enter("list_attached_role_policies", role_name)?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        Ok(page(&role.managed_policies, marker, self.page_size))
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), AwsError> {
        let mut state = self.enter("detach_role_policy", policy_arn)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        let before = role.managed_policies.len();
        role.managed_policies.retain(|p| p != policy_arn);
        if role.managed_policies.len() == before {
            return Err(not_found("managed policy", policy_arn));
        }
        Ok(())
    }

    async fn list_inline_policies_page(
        &self,
        role_name: &str,
        marker: Option<String>,
    ) -> Result<Page<String>, AwsError> {
        let state = self.enter("list_role_policies", role_name)?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        let names: Vec<String> = role.inline_policies.keys().cloned().collect();
        Ok(page(&names, marker, self.page_size))
    }

    async fn delete_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> Result<(), AwsError> {
        let mut state = self.enter("delete_role_policy", policy_name)?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        role.inline_policies
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| not_found("inline policy", policy_name))
    }

    async fn delete_role(&self, role_name: &str) -> Result<(), AwsError> {
        let mut state = self.enter("delete_role", role_name)?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| not_found("role", role_name))?;
        if !role.instance_profiles.is_empty()
            || !role.managed_policies.is_empty()
            || !role.inline_policies.is_empty()
        {
            return Err(AwsError::Internal {
                code: Some("DeleteConflict".to_string()),
                detail: format!("role {role_name} still has attachments"),
            });
        }
        state.roles.remove(role_name);
        Ok(())
    }
}

/// Finding store keyed by (product ARN, finding id)
#[derive(Debug, Default)]
pub struct FakeFindingStore {
    findings: Mutex<Vec<Finding>>,
    batches: Mutex<Vec<usize>>,
    rejected: Mutex<HashSet<String>>,
}

impl FakeFindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn findings(&self) -> Vec<Finding> {
        self.findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Sizes of the import batches received so far
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Archive every finding for `role_arn`
    pub fn archive(&self, role_arn: &str) {
        for finding in self
            .findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter_mut()
            .filter(|f| f.id == role_arn)
        {
            finding.record_state = RecordState::Archived;
        }
    }

    /// Reject future imports of the finding with this id
    pub fn reject(&self, finding_id: &str) {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(finding_id.to_string());
    }

    /// Accept imports of a previously rejected finding again
    pub fn accept(&self, finding_id: &str) {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(finding_id);
    }
}

impl FindingStore for FakeFindingStore {
    async fn has_active_finding(
        &self,
        product_arn: &str,
        role_arn: &str,
    ) -> Result<bool, AwsError> {
        Ok(self
            .findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|f| {
                f.product_arn == product_arn
                    && f.id == role_arn
                    && f.record_state == RecordState::Active
            }))
    }

    async fn import_batch(&self, findings: &[Finding]) -> Result<Vec<ImportFailure>, AwsError> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(findings.len());

        let rejected = self.rejected.lock().unwrap_or_else(|e| e.into_inner());
        let mut stored = self.findings.lock().unwrap_or_else(|e| e.into_inner());
        let mut failures = Vec::new();
        for finding in findings {
            if rejected.contains(&finding.id) {
                failures.push(ImportFailure {
                    id: finding.id.clone(),
                    code: "InvalidInput".to_string(),
                    message: "rejected by fake store".to_string(),
                });
            } else {
                stored.push(finding.clone());
            }
        }
        Ok(failures)
    }
}

/// Execution starter recording (name, input) pairs
#[derive(Debug, Default)]
pub struct FakeExecutions {
    started: Mutex<Vec<(String, String)>>,
}

impl FakeExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(String, String)> {
        self.started.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.started().into_iter().map(|(name, _)| name).collect()
    }
}

impl ExecutionStarter for FakeExecutions {
    async fn start_execution(&self, name: &str, input: &str) -> Result<(), AwsError> {
        let mut started = self.started.lock().unwrap_or_else(|e| e.into_inner());
        // Same name counts as already started
        if !started.iter().any(|(n, _)| n == name) {
            started.push((name.to_string(), input.to_string()));
        }
        Ok(())
    }
}

/// Notifier keeping every request it was asked to send
#[derive(Debug, Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<DecisionRequest>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DecisionRequest> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for FakeNotifier {
    async fn send(&self, request: &DecisionRequest) -> Result<(), AwsError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::iam::{all_instance_profiles, all_roles};
    use rolesweep_test_utils::RoleRecordBuilder;

    #[tokio::test]
    async fn listings_are_paginated() {
        let account = FakeIamAccount::with_page_size(2);
        for i in 0..5 {
            account.add_role(RoleRecordBuilder::new(&format!("role-{i}")).build());
        }

        let roles = all_roles(&account).await.unwrap();
        assert_eq!(roles.len(), 5);
        assert_eq!(account.calls_of("list_roles").len(), 3);
    }

    #[tokio::test]
    async fn delete_with_attachments_conflicts() {
        let account = FakeIamAccount::new();
        let mut role = FakeRole::from(RoleRecordBuilder::new("R1").build());
        role.instance_profiles.push("p1".to_string());
        account.add_role(role);

        assert_eq!(
            all_instance_profiles(&account, "R1").await.unwrap(),
            vec!["p1".to_string()]
        );
        let err = account.delete_role("R1").await.unwrap_err();
        assert_eq!(err.code(), Some("DeleteConflict"));
    }

    #[tokio::test]
    async fn injected_failures_can_be_healed() {
        let account = FakeIamAccount::new();
        account.add_role(RoleRecordBuilder::new("R1").build());
        account.fail("get_role");
        assert!(account.get_role("R1").await.is_err());
        account.heal("get_role");
        assert!(account.get_role("R1").await.is_ok());
    }
}
