// SPDX-License-Identifier: Apache-2.0

//! Keyed blob persistence abstraction.
//!
//! The facade serializes objects itself and writes them here; a store only
//! deals in opaque byte values. A single `set` is all-or-nothing; anything
//! stronger is built above, by serializing writes through the facade's
//! per-kind locks.

use thiserror::Error;

mod mem;
mod redb_store;

pub use mem::MemStore;
pub use redb_store::RedbStore;

/// The ways a store operation may fail. A missing key is not a failure;
/// `get` reports it as `Ok(None)`.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a compare-and-swap
#[derive(Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected value matched and the swap was committed
    Committed,
    /// The stored value did not match the expectation; nothing was written
    Mismatch,
}

/// Blob store contract. Implementations must be safe to call from multiple
/// threads; each call is individually atomic.
pub trait ObjectStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Atomically replace the value at `key` if the stored value equals
    /// `expected` (`None` meaning the key must be absent). A `new` of `None`
    /// deletes the key on match.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<CasOutcome, StoreError>;
    /// All keys starting with `prefix`, sorted.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn exercise(store: &dyn ObjectStore) {
        assert_eq!(store.get("a"), Ok(None));
        store.set("a", b"1").unwrap();
        store.set("ab", b"2").unwrap();
        store.set("b", b"3").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        let keys = store.list_keys("a").unwrap();
        assert_eq!(keys, vec!["a".to_string(), "ab".to_string()]);

        store.delete("ab").unwrap();
        assert_eq!(store.get("ab"), Ok(None));
        // deleting a missing key is not an error
        store.delete("ab").unwrap();

        // cas against an absent key
        assert_eq!(
            store.compare_and_swap("c", None, Some(b"x")).unwrap(),
            CasOutcome::Committed
        );
        assert_eq!(
            store.compare_and_swap("c", None, Some(b"y")).unwrap(),
            CasOutcome::Mismatch
        );
        // cas replace and cas delete
        assert_eq!(
            store.compare_and_swap("c", Some(b"x"), Some(b"y")).unwrap(),
            CasOutcome::Committed
        );
        assert_eq!(
            store.compare_and_swap("c", Some(b"y"), None).unwrap(),
            CasOutcome::Committed
        );
        assert_eq!(store.get("c"), Ok(None));
    }

    #[test]
    fn test_mem_store() {
        exercise(&MemStore::new());
    }

    #[test]
    fn test_redb_store() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(&dir.path().join("infra.db")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_redb_store_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("infra.db");
        {
            let store = RedbStore::open(&path).unwrap();
            store.set("persisted", b"yes").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("persisted").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn test_mem_store_concurrent() {
        let store = Arc::new(MemStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let key = format!("k{i}");
                    store.set(&key, &[i as u8]).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.list_keys("k").unwrap().len(), 8);
    }
}
