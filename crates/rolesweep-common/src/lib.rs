//! rolesweep-common - Shared types for the unused-role lifecycle
//!
//! This crate holds the data model shared by every lifecycle stage, without
//! any AWS SDK dependencies so it stays cheap to build and test.
//!
//! ## Modules
//!
//! - [`allowlist`]: Exemption patterns over role path+name
//! - [`defaults`]: Default configuration values
//! - [`error`]: Configuration and input validation errors
//! - [`execution_name`]: Bounded workflow execution names
//! - [`finding`]: The security finding record and its role snapshot
//! - [`status`]: Lifecycle states and finding record states
//! - [`tags`]: Tag keys, marker policy and fixed identifiers
//! - [`workflow`]: Stage inputs and outputs exchanged with the workflow driver

pub mod allowlist;
pub mod defaults;
pub mod error;
pub mod execution_name;
pub mod finding;
pub mod status;
pub mod tags;
pub mod workflow;

// Re-export commonly used types
pub use allowlist::Allowlist;
pub use error::ConfigError;
pub use finding::{AccountId, Finding, RoleRecord};
pub use status::{LifecycleEvent, LifecycleState, RecordState, ScopeMode};
pub use workflow::WorkflowState;

/// Whole days elapsed between `earlier` and `now`, rounded down.
///
/// Negative spans (clock skew, timestamps in the future) count as zero days.
pub fn days_between(
    earlier: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
) -> i64 {
    (now - earlier).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn days_between_rounds_down() {
        let now = Utc::now();
        assert_eq!(days_between(now - Duration::hours(47), now), 1);
        assert_eq!(days_between(now - Duration::days(75), now), 75);
    }

    #[test]
    fn days_between_clamps_future() {
        let now = Utc::now();
        assert_eq!(days_between(now + Duration::days(3), now), 0);
    }
}
