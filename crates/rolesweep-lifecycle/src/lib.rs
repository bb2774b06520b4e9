//! rolesweep-lifecycle - Unused IAM role lifecycle stages
//!
//! This crate implements the stages a workflow driver invokes to take an
//! unused IAM role from discovery to deletion. It covers the scan, the
//! deactivation, the approval request, and the final validation with
//! teardown. It also holds the AWS wrappers those stages run against.

pub mod aws;
pub mod config;
pub mod retry;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
