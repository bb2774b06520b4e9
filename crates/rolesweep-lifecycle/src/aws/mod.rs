//! AWS service clients
//!
//! Each wrapper turns SDK errors into [`AwsError`] and exposes the
//! operations the stages need behind a trait, so the stages can run against
//! in-memory fakes or mocks.

pub mod context;
pub mod credentials;
pub mod error;
pub mod executions;
pub mod findings;
pub mod iam;
pub mod notify;
pub mod paginate;

pub use context::{AwsContext, FromAwsContext};
pub use credentials::{CredentialBroker, ScopedCredentials};
pub use error::AwsError;
pub use executions::{ExecutionStarter, StepFunctionsStarter};
pub use findings::{FindingStore, ImportFailure, SecurityHubStore};
pub use iam::{IamClient, IamOperations};
pub use notify::{DecisionRequest, Notifier, SesNotifier};
pub use paginate::Page;
