//! Default configuration values shared by every lifecycle stage
//!
//! These constants keep the stages consistent with each other; all of them
//! can be overridden per deployment through the lifecycle configuration.

/// Default maximum number of days a role may go unused
pub const DEFAULT_MAX_UNUSED_DAYS: u32 = 60;

/// Default grace period between deactivation and deletion, in days
pub const DEFAULT_GRACE_PERIOD_DAYS: u32 = 30;

/// Lifetime of assumed cross-account credentials in seconds (15 minutes)
pub const DEFAULT_CREDENTIAL_DURATION_SECS: i32 = 900;

/// Maximum attempts for SDK-level retries
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Initial delay for transient-error retries, in milliseconds
pub const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 200;

/// Cap on the delay between transient-error retries, in milliseconds
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Maximum findings accepted by a single batch import call
pub const MAX_IMPORT_BATCH: usize = 100;

/// Upper bound (exclusive) on workflow execution name length
pub const MAX_EXECUTION_NAME_LEN: usize = 80;

// Serde default functions for struct field defaults

/// Returns the default max unused days
pub fn default_max_unused_days() -> u32 {
    DEFAULT_MAX_UNUSED_DAYS
}

/// Returns the default grace period
pub fn default_grace_period_days() -> u32 {
    DEFAULT_GRACE_PERIOD_DAYS
}

/// Returns the default credential duration
pub fn default_credential_duration_secs() -> i32 {
    DEFAULT_CREDENTIAL_DURATION_SECS
}

/// Returns the default max attempts
pub fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Returns the default retry min delay
pub fn default_retry_min_delay_ms() -> u64 {
    DEFAULT_RETRY_MIN_DELAY_MS
}

/// Returns the default retry max delay
pub fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}
