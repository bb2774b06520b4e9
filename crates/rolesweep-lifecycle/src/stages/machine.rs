//! Stage dispatch for the workflow driver
//!
//! The driver invokes one stage per lifecycle edge with a JSON document and
//! persists whatever comes back. [`LifecycleRunner`] decodes and validates
//! the document. It then acquires credentials for the target account, runs
//! the stage, and drops every client before returning. [`advance`] maps a
//! stage result onto the lifecycle state it produces.

use crate::aws::context::{AwsContext, FromAwsContext};
use crate::aws::credentials::CredentialBroker;
use crate::aws::error::AwsError;
use crate::aws::executions::StepFunctionsStarter;
use crate::aws::findings::SecurityHubStore;
use crate::aws::iam::IamClient;
use crate::aws::notify::SesNotifier;
use crate::config::LifecycleConfig;
use crate::retry::RetryPolicy;
use crate::stages::approval::{ApprovalReceipt, request_approval};
use crate::stages::deactivate::run_deactivation;
use crate::stages::discover::{Discovery, DiscoveryReport, ScanPolicy};
use crate::stages::validate::{ValidationOutcome, validate_and_delete};
use chrono::Utc;
use garde::Validate;
use rolesweep_common::status::TransitionError;
use rolesweep_common::workflow::{
    ApprovalEvent, DeactivateEvent, DeactivationOutcome, DiscoverEvent, ExecutionInput,
    ValidateEvent, WorkflowState,
};
use rolesweep_common::{AccountId, ConfigError, LifecycleEvent, LifecycleState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Stage invoked by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Discover,
    Deactivate,
    RequestApproval,
    Validate,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aws(#[from] AwsError),

    #[error("failed to encode stage result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Deactivation input, either the flat event or the execution input itself
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeactivateInput {
    Event(DeactivateEvent),
    Execution(Box<ExecutionInput>),
}

impl From<DeactivateInput> for DeactivateEvent {
    fn from(input: DeactivateInput) -> Self {
        match input {
            DeactivateInput::Event(event) => event,
            DeactivateInput::Execution(input) => DeactivateEvent::from(input.as_ref()),
        }
    }
}

/// Result document of one stage invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Discovery(DiscoveryReport),
    Deactivation(DeactivationOutcome),
    Approval(ApprovalReceipt),
    Validation(ValidationOutcome),
}

impl StageOutput {
    /// Lifecycle event produced by this result, if any.
    ///
    /// A deactivation that did not apply the marker produces no event; the
    /// workflow for that finding ends there.
    pub fn event(&self) -> Option<LifecycleEvent> {
        match self {
            Self::Discovery(_) => None,
            Self::Deactivation(outcome) => outcome.role_status.then_some(LifecycleEvent::Deactivated),
            Self::Approval(_) => Some(LifecycleEvent::ApprovalRequested),
            Self::Validation(outcome) => Some(outcome.status.event()),
        }
    }
}

/// Apply a stage result to the driver's envelope.
pub fn advance(
    state: &mut WorkflowState,
    output: &StageOutput,
) -> Result<LifecycleState, TransitionError> {
    match output.event() {
        Some(event) => state.advance(event),
        None => Ok(state.state),
    }
}

/// Decode a stage input document and run its field checks.
pub fn decode<T: DeserializeOwned>(input: &str) -> Result<T, ConfigError> {
    Ok(serde_json::from_str(input)?)
}

fn decode_validated<T: DeserializeOwned + Validate<Context = ()>>(
    input: &str,
) -> Result<T, ConfigError> {
    let value: T = decode(input)?;
    value.validate()?;
    Ok(value)
}

/// Runs individual stages against AWS
pub struct LifecycleRunner {
    config: LifecycleConfig,
    policy: ScanPolicy,
    retry: RetryPolicy,
    ctx: AwsContext,
}

impl LifecycleRunner {
    /// Validate `config` and load the process's AWS configuration.
    pub async fn new(config: LifecycleConfig) -> Result<Self, ConfigError> {
        let allowlist = config.check()?;
        let ctx = AwsContext::new(&config.region, config.max_attempts).await;

        Ok(Self {
            policy: ScanPolicy {
                allowlist,
                max_days: config.max_unused_days,
                default_owner_email: config.default_owner_email.clone(),
                grace_period_days: config.grace_period_days,
            },
            retry: config.retry_policy(),
            config,
            ctx,
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Fresh IAM client in `account_id`, valid for this invocation only
    async fn iam_for(&self, account_id: &AccountId) -> Result<IamClient, AwsError> {
        let broker = CredentialBroker::new(
            &self.ctx,
            self.config.credential_duration_secs,
            self.retry.clone(),
        );
        let scoped = broker
            .acquire(account_id, &self.config.cross_account_role)
            .await?;
        Ok(scoped.iam_client())
    }

    pub async fn discover(&self, event: &DiscoverEvent) -> Result<DiscoveryReport, StageError> {
        let account_id = self.config.discovery_target(event)?;
        let iam = self.iam_for(&account_id).await?;
        let store = SecurityHubStore::from_context(&self.ctx);
        let executions = StepFunctionsStarter::new(
            self.ctx.sfn_client(),
            self.config.state_machine_arn.clone(),
        );

        let discovery = Discovery {
            iam: &iam,
            store: &store,
            executions: &executions,
            retry: &self.retry,
        };
        let ctx = self.config.finding_context(event.notification_time);
        Ok(discovery
            .run(&account_id, &self.policy, &ctx, Utc::now())
            .await?)
    }

    pub async fn deactivate(
        &self,
        event: &DeactivateEvent,
    ) -> Result<DeactivationOutcome, StageError> {
        let iam = self.iam_for(&event.target_account_id).await?;
        Ok(run_deactivation(&iam, event, Utc::now(), self.config.grace_period_days).await?)
    }

    pub async fn request_approval(
        &self,
        event: &ApprovalEvent,
    ) -> Result<ApprovalReceipt, StageError> {
        let notifier = SesNotifier::new(self.ctx.ses_client());
        Ok(request_approval(
            &notifier,
            event,
            &self.config.approval_endpoint,
            &self.config.notification_sender,
        )
        .await?)
    }

    pub async fn validate(&self, event: &ValidateEvent) -> Result<ValidationOutcome, StageError> {
        let iam = self.iam_for(&event.account_id).await?;
        Ok(validate_and_delete(&iam, event, Utc::now()).await?)
    }

    /// Decode `input` for `stage`, run it, and return the result document.
    pub async fn run(&self, stage: Stage, input: &str) -> Result<StageOutput, StageError> {
        info!(stage = ?stage, "Running stage");

        let output = match stage {
            Stage::Discover => StageOutput::Discovery(self.discover(&decode(input)?).await?),
            Stage::Deactivate => {
                let event: DeactivateEvent = decode::<DeactivateInput>(input)?.into();
                event.validate().map_err(ConfigError::from)?;
                StageOutput::Deactivation(self.deactivate(&event).await?)
            }
            Stage::RequestApproval => {
                StageOutput::Approval(self.request_approval(&decode_validated(input)?).await?)
            }
            Stage::Validate => {
                StageOutput::Validation(self.validate(&decode_validated(input)?).await?)
            }
        };

        Ok(output)
    }
}

/// Encode a stage result for the driver.
pub fn encode(output: &StageOutput) -> Result<String, StageError> {
    serde_json::to_string(output).map_err(StageError::Encode)
}
