//! Shared test utilities for rolesweep
//!
//! ## Modules
//!
//! - [`aws`]: Test account ids, region detection and unique run ids
//! - [`roles`]: Builder for role snapshots with relative timestamps

pub mod aws;
pub mod roles;

// Re-export commonly used items
pub use aws::{
    TEST_ACCOUNT_ID, TEST_OTHER_ACCOUNT_ID, TEST_SECURITY_ACCOUNT_ID, get_test_region,
    test_run_id,
};
pub use roles::RoleRecordBuilder;
