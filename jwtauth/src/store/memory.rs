//! In-memory revocation store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{ActiveRecord, BlacklistRecord, PurgeResult, RevocationStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    active: HashMap<String, ActiveRecord>,
    blacklist: HashMap<String, BlacklistRecord>,
}

/// Revocation store backed by two hash maps behind one lock.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    tables: RwLock<Tables>,
}

impl MemoryRevocationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active records.
    pub fn active_len(&self) -> Result<usize, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.active.len())
    }

    /// Number of blacklist records.
    pub fn blacklist_len(&self) -> Result<usize, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.blacklist.len())
    }

    /// The active record for `token_string`, if any.
    pub fn active_record(&self, token_string: &str) -> Result<Option<ActiveRecord>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.active.get(token_string).cloned())
    }
}

impl RevocationStore for MemoryRevocationStore {
    fn is_active(&self, token_string: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.active.contains_key(token_string))
    }

    fn is_blacklisted(&self, token_string: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.blacklist.contains_key(token_string))
    }

    fn insert_active(&self, record: ActiveRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = tables.active.get(&record.token_string) {
            if *existing == record {
                return Ok(());
            }
            return Err(StoreError::Duplicate);
        }
        tables.active.insert(record.token_string.clone(), record);
        Ok(())
    }

    fn delete_active(&self, token_string: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.active.remove(token_string);
        Ok(())
    }

    fn insert_blacklisted(&self, record: BlacklistRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables
            .blacklist
            .insert(record.token_string.clone(), record);
        Ok(())
    }

    fn purge_expired(&self, now: u64) -> Result<PurgeResult, StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;

        let active_before = tables.active.len();
        tables.active.retain(|_, record| record.expires_at > now);
        let blacklist_before = tables.blacklist.len();
        tables.blacklist.retain(|_, record| record.expires_at > now);

        Ok(PurgeResult {
            active_removed: active_before - tables.active.len(),
            blacklisted_removed: blacklist_before - tables.blacklist.len(),
        })
    }
}
