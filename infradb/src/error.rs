// SPDX-License-Identifier: Apache-2.0

//! Error type shared by all InfraDB operations

use crate::store::StoreError;
use thiserror::Error;

/// The reasons why an InfraDB operation may fail
#[derive(Debug, Error, PartialEq)]
pub enum InfraError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Object '{0}' not found")]
    NotFound(String),

    #[error("Referenced object '{0}' not found")]
    ReferenceNotFound(String),

    #[error("Reference conflict: {0}")]
    ReferenceConflict(String),

    #[error("Object '{0}' still has dependent objects")]
    HasDependents(String),

    #[error("Resource version mismatch for object '{0}'")]
    VersionMismatch(String),

    #[error("No subscribers registered for {0} objects")]
    NoSubscribers(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(&'static str),
}

/// Result alias used across the crate
pub type InfraResult<T> = Result<T, InfraError>;
