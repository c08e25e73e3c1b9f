// SPDX-License-Identifier: Apache-2.0

//! FRR back-end module.
//!
//! Subscribes to VRF and SVI events, renders the corresponding FRR
//! configuration, applies it through `frr-reload.py` and reports component
//! status back into InfraDB. Also implements the `preReplay` action: before
//! intent is re-driven the daemon is restarted on its basic configuration.

pub mod module;
pub mod renderer;

pub use module::{FrrActionHandler, FrrModule, FRR_COMPONENT};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrrErr {
    #[error("Failed to run '{0}': {1}")]
    CommandFailed(String, String),

    #[error("Reload rejected the configuration: {0}")]
    ReloadErr(String),

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Decoding error: {0}")]
    DecodeError(String),
}
