// SPDX-License-Identifier: Apache-2.0

//! API error taxonomy surfaced at the management boundary

use infradb::InfraError;
use thiserror::Error;

/// The error kinds a management client can observe. The mapping from the
/// facade is intent-based: once a request was accepted and persisted,
/// back-end failures never surface here.
#[derive(Debug, Error, PartialEq)]
pub enum ApiError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// A concurrent writer raced this request; retry with a fresh read.
    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl From<InfraError> for ApiError {
    fn from(e: InfraError) -> Self {
        match e {
            InfraError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            InfraError::NotFound(name) => ApiError::NotFound(name),
            InfraError::ReferenceNotFound(name) => {
                ApiError::FailedPrecondition(format!("referenced object '{name}' not found"))
            }
            InfraError::ReferenceConflict(msg) => ApiError::FailedPrecondition(msg),
            InfraError::HasDependents(name) => {
                ApiError::FailedPrecondition(format!("object '{name}' still has dependents"))
            }
            InfraError::Forbidden(msg) => ApiError::FailedPrecondition(msg.to_string()),
            InfraError::VersionMismatch(name) => {
                ApiError::Aborted(format!("object '{name}' was modified concurrently"))
            }
            InfraError::NoSubscribers(kind) => {
                ApiError::Internal(format!("no back end handles {kind} objects"))
            }
            InfraError::Store(e) => ApiError::Unavailable(e.to_string()),
            InfraError::Internal(msg) => ApiError::Internal(msg.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_errors_become_failed_precondition() {
        let e: ApiError = InfraError::ReferenceNotFound("lb9".to_string()).into();
        assert!(matches!(e, ApiError::FailedPrecondition(_)));
        let e: ApiError = InfraError::HasDependents("v1".to_string()).into();
        assert!(matches!(e, ApiError::FailedPrecondition(_)));
    }

    #[test]
    fn test_version_mismatch_becomes_aborted() {
        let e: ApiError = InfraError::VersionMismatch("v1".to_string()).into();
        assert!(matches!(e, ApiError::Aborted(_)));
    }
}
