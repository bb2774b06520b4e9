//! AWS configuration contexts
//!
//! [`AwsContext`] holds the SDK configuration of the lifecycle process
//! itself (security account). Configuration scoped to a target account is
//! derived from it with assumed credentials, see
//! [`crate::aws::credentials`]. Both live for one stage invocation and are
//! dropped with it; nothing is cached across stages.

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use std::sync::Arc;

/// Configuration context of the lifecycle process.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
    max_attempts: u32,
}

impl AwsContext {
    /// Load AWS configuration for the specified region.
    ///
    /// SDK retries use the standard mode, capped at `max_attempts`.
    pub async fn new(region: &str, max_attempts: u32) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .retry_config(RetryConfig::standard().with_max_attempts(max_attempts))
            .load()
            .await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
            max_attempts,
        }
    }

    /// Get the underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Get the region string.
    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Derive an SDK config for another account using assumed credentials.
    pub fn with_credentials(&self, credentials: SharedCredentialsProvider) -> SdkConfig {
        self.config
            .to_builder()
            .credentials_provider(credentials)
            .build()
    }

    /// Create an STS client from this context.
    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(self.sdk_config())
    }

    /// Create a Security Hub client from this context.
    pub fn securityhub_client(&self) -> aws_sdk_securityhub::Client {
        aws_sdk_securityhub::Client::new(self.sdk_config())
    }

    /// Create a Step Functions client from this context.
    pub fn sfn_client(&self) -> aws_sdk_sfn::Client {
        aws_sdk_sfn::Client::new(self.sdk_config())
    }

    /// Create an SES client from this context.
    pub fn ses_client(&self) -> aws_sdk_sesv2::Client {
        aws_sdk_sesv2::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Trait for clients that can be constructed from an [`AwsContext`].
pub trait FromAwsContext {
    fn from_context(ctx: &AwsContext) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require AWS credentials and are marked as integration tests
    // They are skipped in regular test runs

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_context_creation() {
        let ctx = AwsContext::new("us-west-2", 5).await;
        assert_eq!(ctx.region(), "us-west-2");
        assert_eq!(ctx.max_attempts(), 5);
    }
}
