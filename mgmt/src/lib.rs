// SPDX-License-Identifier: Apache-2.0

//! Management ingress of the EVPN gateway.
//!
//! The services here are the RPC-shaped surface over InfraDB: they validate
//! requests (resource-id grammar, field masks, pagination), translate them
//! into facade calls and map facade errors onto the API error taxonomy.
//! The wire transport itself lives outside this crate.

pub mod errors;
pub mod grpc;

#[cfg(test)]
pub(crate) mod testutil;

pub use errors::ApiError;
