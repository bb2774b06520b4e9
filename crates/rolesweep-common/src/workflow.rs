//! Stage inputs and outputs exchanged with the workflow driver
//!
//! The driver owns persistence between stages. Each stage reads the fields
//! it needs from its input document and returns a result document; nothing
//! is carried in memory from one stage to the next. Field names are
//! camelCase on the wire. Older driver definitions spell `maxDays` as
//! `maxdays`, which is accepted as an alias.

use crate::finding::{AccountId, Finding};
use crate::status::{LifecycleEvent, LifecycleState, TransitionError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Input of the discovery stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverEvent {
    /// Target account; absent in single-account deployments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    /// Time of the triggering notification, stamped on every finding
    #[serde(alias = "time", alias = "timestamp")]
    pub notification_time: DateTime<Utc>,
}

/// Input handed to a new workflow execution for one finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    pub finding: Finding,
    pub wait_until: DateTime<Utc>,
}

/// Input of the deactivation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateEvent {
    #[garde(skip)]
    pub target_account_id: AccountId,
    #[serde(alias = "maxdays")]
    #[garde(range(min = 1))]
    pub max_days: u32,
    #[garde(length(min = 1, max = 64))]
    pub role_name: String,
    /// Grace deadline computed at emission time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub wait_until: Option<DateTime<Utc>>,
}

impl From<&ExecutionInput> for DeactivateEvent {
    fn from(input: &ExecutionInput) -> Self {
        let fields = &input.finding.user_defined_fields;
        Self {
            target_account_id: fields.target_account_id.clone(),
            max_days: fields.max_days,
            role_name: fields.role_name.clone(),
            wait_until: Some(input.wait_until),
        }
    }
}

/// Output of the deactivation stage, consumed by the wait and validation stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationOutcome {
    pub role_name: String,
    pub account_id: AccountId,
    #[serde(alias = "maxdays")]
    pub max_days: u32,
    pub wait_until: DateTime<Utc>,
    /// True once the marker policy and the tag are applied. False when the
    /// role was found in use or without usage data and left untouched.
    pub role_status: bool,
}

/// Input of the validation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, garde::Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateEvent {
    #[garde(skip)]
    pub account_id: AccountId,
    #[garde(length(min = 1, max = 64))]
    pub role_name: String,
    #[serde(alias = "maxdays")]
    #[garde(range(min = 1))]
    pub max_days: u32,
}

impl From<&DeactivationOutcome> for ValidateEvent {
    fn from(outcome: &DeactivationOutcome) -> Self {
        Self {
            account_id: outcome.account_id.clone(),
            role_name: outcome.role_name.clone(),
            max_days: outcome.max_days,
        }
    }
}

/// Input of the approval stage
#[derive(Debug, Clone, Serialize, Deserialize, garde::Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    /// Opaque single-use callback token issued by the driver
    #[garde(length(min = 1))]
    pub task_token: String,
    #[garde(skip)]
    pub finding: Finding,
}

/// Per-finding envelope persisted by the workflow driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_token: Option<String>,
    pub wait_until: DateTime<Utc>,
    #[serde(default)]
    pub deactivated: bool,
}

impl WorkflowState {
    /// Envelope for a freshly emitted finding; the grace deadline is fixed here.
    pub fn at_emission(now: DateTime<Utc>, grace_period_days: u32) -> Self {
        Self {
            state: LifecycleState::Discovered,
            task_token: None,
            wait_until: grace_deadline(now, grace_period_days),
            deactivated: false,
        }
    }

    /// Advance the envelope by one event
    pub fn advance(&mut self, event: LifecycleEvent) -> Result<LifecycleState, TransitionError> {
        self.state = self.state.apply(event)?;
        if event == LifecycleEvent::Deactivated {
            self.deactivated = true;
        }
        Ok(self.state)
    }

    pub fn grace_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.wait_until
    }
}

/// `now + days`, the moment the driver may resume a deactivated role
pub fn grace_deadline(now: DateTime<Utc>, grace_period_days: u32) -> DateTime<Utc> {
    now + Duration::days(i64::from(grace_period_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[test]
    fn discover_event_accepts_scheduler_time_field() {
        let event: DiscoverEvent =
            serde_json::from_str(r#"{"time": "2026-03-01T12:00:00Z"}"#).unwrap();
        assert!(event.account_id.is_none());

        let event: DiscoverEvent = serde_json::from_str(
            r#"{"accountId": "111122223333", "notificationTime": "2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event.account_id.unwrap().as_str(), "111122223333");
    }

    #[test]
    fn discover_event_rejects_bad_account() {
        let result: Result<DiscoverEvent, _> = serde_json::from_str(
            r#"{"accountId": "nope", "notificationTime": "2026-03-01T12:00:00Z"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn deactivation_outcome_feeds_validation() {
        let outcome: DeactivationOutcome = serde_json::from_str(
            r#"{
                "roleName": "R1",
                "accountId": "111122223333",
                "maxdays": 60,
                "waitUntil": "2026-04-01T00:00:00Z",
                "roleStatus": true
            }"#,
        )
        .unwrap();
        let event = ValidateEvent::from(&outcome);
        assert_eq!(event.max_days, 60);
        assert_eq!(event.role_name, "R1");

        // The raw outcome document also deserializes straight into the next input
        let json = serde_json::to_value(&outcome).unwrap();
        let direct: ValidateEvent = serde_json::from_value(json).unwrap();
        assert_eq!(direct, event);
    }

    #[test]
    fn stage_inputs_are_validated() {
        let event = ValidateEvent {
            account_id: AccountId::parse("111122223333").unwrap(),
            role_name: String::new(),
            max_days: 0,
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn grace_deadline_is_fixed_at_emission() {
        let now = Utc::now();
        let mut state = WorkflowState::at_emission(now, 30);
        assert_eq!(state.wait_until, now + Duration::days(30));
        assert!(!state.grace_elapsed(now + Duration::days(29)));
        assert!(state.grace_elapsed(now + Duration::days(30)));

        state.advance(LifecycleEvent::Deactivated).unwrap();
        assert!(state.deactivated);
        // Advancing does not move the deadline
        assert_eq!(state.wait_until, now + Duration::days(30));
    }
}
