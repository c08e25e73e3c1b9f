// SPDX-License-Identifier: Apache-2.0

//! In-memory store used by the test suite and CI builds

use super::{CasOutcome, ObjectStore, StoreError};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

/// A [`BTreeMap`] behind a mutex. Keys come back sorted for free.
#[derive(Debug, Default)]
pub struct MemStore {
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // a poisoned map means a writer panicked mid-operation; the map
        // itself is still consistent since every mutation is a single call
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ObjectStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<CasOutcome, StoreError> {
        let mut map = self.lock();
        if map.get(key).map(Vec::as_slice) != expected {
            return Ok(CasOutcome::Mismatch);
        }
        match new {
            Some(value) => {
                map.insert(key.to_string(), value.to_vec());
            }
            None => {
                map.remove(key);
            }
        }
        Ok(CasOutcome::Committed)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let map = self.lock();
        let keys = map
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }
}
