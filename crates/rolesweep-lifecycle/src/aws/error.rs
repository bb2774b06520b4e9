//! AWS error classification and handling
//!
//! Every SDK error is reduced to an [`AwsError`] kind using the `.code()`
//! reported through `ProvideErrorMetadata`, so callers branch on the kind
//! instead of matching on message strings.

use aws_sdk_iam::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories for retry, cleanup and reporting logic
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// The lifecycle process may not assume the cross-account role (fatal)
    #[error("rolesweep does not have permission to assume the IAM role {role_arn}")]
    PermissionDenied { role_arn: String },

    /// Resource was not found (benign when deleting, fatal when evaluating)
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: &'static str,
        resource_id: String,
    },

    /// Resource already exists (safe to ignore for idempotent creates)
    #[error("Resource already exists")]
    AlreadyExists,

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Request or configuration rejected as malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other remote failure. The code and detail are kept for logs; the
    /// display text is fixed so internal error taxonomies never leak.
    #[error("InternalError")]
    Internal {
        code: Option<String>,
        detail: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled)
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, AwsError::AlreadyExists)
    }

    /// Check if this is a permission failure
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, AwsError::PermissionDenied { .. })
    }

    /// Attach the resource that was being operated on to a `NotFound` error.
    pub fn for_resource(self, resource_type: &'static str, resource_id: &str) -> Self {
        match self {
            AwsError::NotFound { .. } => AwsError::NotFound {
                resource_type,
                resource_id: resource_id.to_string(),
            },
            other => other,
        }
    }

    /// Original remote error code, if one was reported
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Internal { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchEntity",
    "NoSuchEntityException",
    "ResourceNotFoundException",
    "StateMachineDoesNotExist",
];

/// Known AWS error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &["EntityAlreadyExists", "ExecutionAlreadyExists"];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "LimitExceededException",
];

/// Known AWS error codes for authorization failures
const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "AccessDeniedException"];

/// Known AWS error codes for malformed requests
const VALIDATION_CODES: &[&str] = &[
    "ValidationError",
    "ValidationException",
    "InvalidInput",
    "InvalidInputException",
    "MalformedPolicyDocument",
    "InvalidName",
    "InvalidExecutionInput",
];

/// Classify an AWS error from its code and message.
///
/// `PermissionDenied` carries no role here; [`crate::aws::credentials`]
/// replaces it with one naming the role that could not be assumed.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_type: "resource",
            resource_id: message,
        },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => AwsError::AlreadyExists,
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::PermissionDenied {
            role_arn: String::new(),
        },
        Some(c) if VALIDATION_CODES.contains(&c) => AwsError::Validation(message),
        _ => AwsError::Internal {
            code: code.map(|s| s.to_string()),
            detail: message,
        },
    }
}

/// Classify any SDK error by its reported metadata.
///
/// Errors that never reached the service (timeouts, dispatch failures) have
/// no code and classify as `Internal` with the full error chain as detail.
pub fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(_) => classify_aws_error(err.code(), err.message()),
        _ => AwsError::Internal {
            code: None,
            detail: format!("{err:?}"),
        },
    }
}

impl<E, R> From<SdkError<E, R>> for AwsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        classify_sdk_error(&err)
    }
}

/// Treat `NotFound` as success, for removals that may already have happened.
pub fn ignore_not_found(result: Result<(), AwsError>) -> Result<(), AwsError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
