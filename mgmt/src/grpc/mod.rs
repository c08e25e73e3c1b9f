// SPDX-License-Identifier: Apache-2.0

//! Shared request plumbing: resource-name grammar and pagination

pub mod bridge;
pub mod port;
pub mod svi;
pub mod vrf;

pub use bridge::LogicalBridgeService;
pub use port::BridgePortService;
pub use svi::SviService;
pub use vrf::VrfService;

use crate::errors::ApiError;
use infradb::objects::ObjectType;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

const RESOURCE_ID_MAX: usize = 63;

/// User-settable resource ids: a letter first, lowercase alphanumerics and
/// hyphens after, no trailing hyphen, at most 63 characters.
pub fn validate_resource_id(id: &str) -> Result<(), ApiError> {
    let bad = |why: &str| {
        Err(ApiError::InvalidArgument(format!(
            "invalid resource id '{id}': {why}"
        )))
    };
    if id.is_empty() || id.len() > RESOURCE_ID_MAX {
        return bad("must be 1-63 characters");
    }
    let mut chars = id.chars();
    let first = chars.next().unwrap_or_default();
    if !first.is_ascii_lowercase() {
        return bad("must start with a letter");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return bad("only lowercase letters, digits and hyphens are allowed");
    }
    if id.ends_with('-') {
        return bad("must not end with a hyphen");
    }
    Ok(())
}

/// Full resource names: `//network.opiproject.org/<plural>/<id>`.
pub fn validate_resource_name(kind: ObjectType, name: &str) -> Result<(), ApiError> {
    let prefix = format!("{}/", kind.sentinel_key());
    let Some(id) = name.strip_prefix(&prefix) else {
        return Err(ApiError::InvalidArgument(format!(
            "resource name '{name}' does not match '{prefix}<id>'"
        )));
    };
    // GRD is system-assigned and excepted from the user-settable grammar
    if kind == ObjectType::Vrf && id == "GRD" {
        return Ok(());
    }
    validate_resource_id(id)
}

/// Turn a client-supplied (possibly empty) resource id into a full name,
/// generating an id when the client left the choice to the system.
pub fn resolve_id(kind: ObjectType, id: &str) -> Result<String, ApiError> {
    if id.is_empty() {
        let generated = format!("gen-{}", Uuid::new_v4().as_simple());
        return Ok(kind.resource_name(&generated));
    }
    validate_resource_id(id)?;
    Ok(kind.resource_name(id))
}

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 250;

/// Process-local pagination state: opaque single-use tokens mapped to list
/// offsets. Tokens do not survive a restart.
#[derive(Default)]
pub struct Pagination {
    tokens: Mutex<HashMap<String, usize>>,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `(page_size, page_token)` into `(size, offset)`. A used or
    /// unknown token is an error; tokens are consumed by this call.
    pub fn extract(&self, page_size: i32, page_token: &str) -> Result<(usize, usize), ApiError> {
        if page_size < 0 {
            return Err(ApiError::InvalidArgument(
                "page size must not be negative".to_string(),
            ));
        }
        let size = match page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => (n as usize).min(MAX_PAGE_SIZE),
        };
        if page_token.is_empty() {
            return Ok((size, 0));
        }
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        match tokens.remove(page_token) {
            Some(offset) => Ok((size, offset)),
            None => Err(ApiError::InvalidArgument(format!(
                "unknown pagination token '{page_token}'"
            ))),
        }
    }

    /// Issue a fresh token for the next page starting at `offset`.
    pub fn issue(&self, offset: usize) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.clone(), offset);
        token
    }
}

/// Slice one page out of a sorted listing; returns the page and the next
/// token, if more elements remain.
pub(crate) fn paginate<T: Clone>(
    all: &[T],
    size: usize,
    offset: usize,
    pagination: &Pagination,
) -> (Vec<T>, String) {
    let start = offset.min(all.len());
    let end = (start + size).min(all.len());
    let page = all[start..end].to_vec();
    let next = if end < all.len() {
        pagination.issue(end)
    } else {
        String::new()
    };
    (page, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_grammar() {
        assert!(validate_resource_id("blue").is_ok());
        assert!(validate_resource_id("blue-2").is_ok());
        assert!(validate_resource_id("").is_err());
        assert!(validate_resource_id("Blue").is_err());
        assert!(validate_resource_id("2blue").is_err());
        assert!(validate_resource_id("blue-").is_err());
        assert!(validate_resource_id("blue_2").is_err());
        assert!(validate_resource_id(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_resource_name_grammar() {
        assert!(
            validate_resource_name(ObjectType::Vrf, "//network.opiproject.org/vrfs/blue").is_ok()
        );
        assert!(validate_resource_name(ObjectType::Vrf, "//network.opiproject.org/vrfs/GRD").is_ok());
        assert!(
            validate_resource_name(ObjectType::Vrf, "//network.opiproject.org/bridges/blue")
                .is_err()
        );
        assert!(validate_resource_name(ObjectType::Vrf, "vrfs/blue").is_err());
    }

    #[test]
    fn test_resolve_id_generates_when_empty() {
        let name = resolve_id(ObjectType::Svi, "").unwrap();
        assert!(name.starts_with("//network.opiproject.org/svis/gen-"));
        assert_eq!(
            resolve_id(ObjectType::Svi, "svi-one").unwrap(),
            "//network.opiproject.org/svis/svi-one"
        );
        assert!(resolve_id(ObjectType::Svi, "SVI").is_err());
    }

    #[test]
    fn test_pagination_tokens_are_single_use() {
        let pagination = Pagination::new();
        let (size, offset) = pagination.extract(0, "").unwrap();
        assert_eq!((size, offset), (50, 0));

        let token = pagination.issue(50);
        assert_eq!(pagination.extract(10, &token).unwrap(), (10, 50));
        // the token was consumed
        assert!(pagination.extract(10, &token).is_err());

        assert!(pagination.extract(-1, "").is_err());
        assert_eq!(pagination.extract(100_000, "").unwrap(), (250, 0));
    }

    #[test]
    fn test_paginate_slices_and_links() {
        let pagination = Pagination::new();
        let all: Vec<u32> = (0..5).collect();
        let (page, next) = paginate(&all, 2, 0, &pagination);
        assert_eq!(page, vec![0, 1]);
        let (size, offset) = pagination.extract(2, &next).unwrap();
        let (page, next) = paginate(&all, size, offset, &pagination);
        assert_eq!(page, vec![2, 3]);
        let (size, offset) = pagination.extract(2, &next).unwrap();
        let (page, next) = paginate(&all, size, offset, &pagination);
        assert_eq!(page, vec![4]);
        assert!(next.is_empty());
    }
}
