//! Lifecycle stages
//!
//! Each stage is a single-account, stateless step invoked once per
//! lifecycle edge. Stages are generic over the AWS operation traits so they
//! run unchanged against the real clients, mocks, or the fakes in
//! the `testing` module.

pub mod approval;
pub mod deactivate;
pub mod discover;
pub mod machine;
pub mod validate;

pub use approval::{ApprovalReceipt, callback_links, request_approval};
pub use deactivate::{deactivate, run_deactivation};
pub use discover::{Discovery, DiscoveryReport, ScanPolicy, Verdict, evaluate};
pub use machine::{LifecycleRunner, Stage, StageError, StageOutput, advance};
pub use validate::{ValidationOutcome, ValidationStatus, validate_and_delete};
