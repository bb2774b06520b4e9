//! Workflow execution starts

use crate::aws::error::AwsError;
use aws_sdk_sfn::Client;
use tracing::{debug, info};

/// Trait for starting one workflow execution per emitted finding
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionStarter: Send + Sync {
    /// Start an execution; an existing execution with the same name counts as started.
    async fn start_execution(&self, name: &str, input: &str) -> Result<(), AwsError>;
}

/// Step Functions state machine driving the role lifecycle
pub struct StepFunctionsStarter {
    client: Client,
    state_machine_arn: String,
}

impl StepFunctionsStarter {
    pub fn new(client: Client, state_machine_arn: impl Into<String>) -> Self {
        Self {
            client,
            state_machine_arn: state_machine_arn.into(),
        }
    }
}

impl ExecutionStarter for StepFunctionsStarter {
    async fn start_execution(&self, name: &str, input: &str) -> Result<(), AwsError> {
        let result = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .name(name)
            .input(input)
            .send()
            .await;

        match result {
            Ok(resp) => {
                info!(execution = %name, execution_arn = %resp.execution_arn(), "Execution started");
                Ok(())
            }
            Err(e) => match AwsError::from(e) {
                err if err.is_already_exists() => {
                    debug!(execution = %name, "Execution already exists");
                    Ok(())
                }
                err => Err(err),
            },
        }
    }
}
