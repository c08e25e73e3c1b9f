// SPDX-License-Identifier: Apache-2.0

//! Persistent store backed by an embedded redb database

use super::{CasOutcome, ObjectStore, StoreError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use tracing::debug;

const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

fn unavailable(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Store over a single-file redb database with one `objects` table. Every
/// call runs in its own transaction, so an individual `set` either commits
/// fully or not at all.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at `path` and make sure the objects
    /// table exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!("Opening object store at {}...", path.display());
        let db = Database::create(path).map_err(unavailable)?;
        let txn = db.begin_write().map_err(unavailable)?;
        txn.open_table(OBJECTS).map_err(unavailable)?;
        txn.commit().map_err(unavailable)?;
        Ok(Self { db })
    }
}

impl ObjectStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let table = txn.open_table(OBJECTS).map_err(unavailable)?;
        let value = table
            .get(key)
            .map_err(unavailable)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(unavailable)?;
            table.insert(key, value).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = txn.open_table(OBJECTS).map_err(unavailable)?;
            table.remove(key).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: Option<&[u8]>,
    ) -> Result<CasOutcome, StoreError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        let outcome = {
            let mut table = txn.open_table(OBJECTS).map_err(unavailable)?;
            let current = table
                .get(key)
                .map_err(unavailable)?
                .map(|guard| guard.value().to_vec());
            if current.as_deref() != expected {
                CasOutcome::Mismatch
            } else {
                match new {
                    Some(value) => {
                        table.insert(key, value).map_err(unavailable)?;
                    }
                    None => {
                        table.remove(key).map_err(unavailable)?;
                    }
                }
                CasOutcome::Committed
            }
        };
        txn.commit().map_err(unavailable)?;
        Ok(outcome)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let table = txn.open_table(OBJECTS).map_err(unavailable)?;
        let mut keys = Vec::new();
        for entry in table.range(prefix..).map_err(unavailable)? {
            let (key, _) = entry.map_err(unavailable)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}
