//! AWS test utilities
//!
//! Provides fixed account ids, region detection and unique run ID generation.

use chrono::Utc;

/// Member account used by unit and scenario tests
pub const TEST_ACCOUNT_ID: &str = "111122223333";

/// Second member account, for cross-account uniqueness checks
pub const TEST_OTHER_ACCOUNT_ID: &str = "444455556666";

/// Security account that owns findings in tests
pub const TEST_SECURITY_ACCOUNT_ID: &str = "999988887777";

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to us-west-2
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-west-2".to_string())
}

/// Generate a unique run ID for test resources.
///
/// Format: `test-{timestamp_ms}-{counter}`.
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let run_id = test_run_id();
        let parts: Vec<&str> = run_id.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(test_run_id(), test_run_id());
    }
}
