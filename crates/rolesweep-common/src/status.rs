//! Lifecycle states, finding record states and scope modes
//!
//! The lifecycle is driven by an external workflow engine that invokes one
//! stage per edge. Any edge may be delivered more than once, so
//! [`LifecycleState::apply`] accepts a redelivered event whose target is the
//! current state and returns that state unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of a single role in its lifecycle
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LifecycleState {
    /// Finding emitted, role untouched
    Discovered,
    /// Deny-all marker attached
    Deactivated,
    /// Decision request sent to the owner
    AwaitingApproval,
    /// Approved; waiting for the grace period to elapse
    WaitingGracePeriod,
    /// Re-checking usage before deletion
    Validating,
    /// Role and its attachments are gone
    Deleted,
    /// Owner chose to keep the role
    Denied,
    /// Role was used again during the grace period and was kept
    Retained,
}

/// Edge between two lifecycle states
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LifecycleEvent {
    Deactivated,
    ApprovalRequested,
    Approved,
    Denied,
    GraceElapsed,
    Deleted,
    Retained,
}

/// An event that is not valid from the current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply {event} to a role in state {from}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub event: LifecycleEvent,
}

impl LifecycleEvent {
    /// State this event leads to
    pub fn target(self) -> LifecycleState {
        match self {
            Self::Deactivated => LifecycleState::Deactivated,
            Self::ApprovalRequested => LifecycleState::AwaitingApproval,
            Self::Approved => LifecycleState::WaitingGracePeriod,
            Self::Denied => LifecycleState::Denied,
            Self::GraceElapsed => LifecycleState::Validating,
            Self::Deleted => LifecycleState::Deleted,
            Self::Retained => LifecycleState::Retained,
        }
    }

    /// State this event must be applied from
    pub fn source(self) -> LifecycleState {
        match self {
            Self::Deactivated => LifecycleState::Discovered,
            Self::ApprovalRequested => LifecycleState::Deactivated,
            Self::Approved | Self::Denied => LifecycleState::AwaitingApproval,
            Self::GraceElapsed => LifecycleState::WaitingGracePeriod,
            Self::Deleted | Self::Retained => LifecycleState::Validating,
        }
    }
}

impl LifecycleState {
    /// Apply an event, tolerating redelivery of the event that produced `self`.
    pub fn apply(self, event: LifecycleEvent) -> Result<Self, TransitionError> {
        if event.source() == self || event.target() == self {
            Ok(event.target())
        } else {
            Err(TransitionError { from: self, event })
        }
    }

    /// Check if no further events can be applied
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Denied | Self::Retained)
    }
}

/// Record state of a finding in the findings store
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RecordState {
    #[default]
    Active,
    Archived,
}

/// How the set of target accounts is produced
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum ScopeMode {
    /// One configured account
    #[default]
    #[strum(to_string = "single-account", serialize = "account")]
    SingleAccount,
    /// Every active account in the organization
    #[strum(to_string = "organization")]
    Organization,
    /// Every active account under one organizational unit
    #[strum(to_string = "organizational-unit", serialize = "organizationalunit")]
    OrganizationalUnit,
}
