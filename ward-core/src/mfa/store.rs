use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::MfaRecord;
use crate::error::BoxError;

#[async_trait]
pub trait MfaStore: Send + Sync {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaRecord>, BoxError>;

    /// Write `record` if the stored version is still `expected_version`
    /// (0: no row yet). Returns `false` when another writer got there first.
    async fn save(&self, record: &MfaRecord, expected_version: i64) -> Result<bool, BoxError>;
}

/// In-memory MFA store
#[derive(Default)]
pub struct MemoryMfaStore {
    records: DashMap<String, MfaRecord>,
}

impl MemoryMfaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaStore for MemoryMfaStore {
    async fn load(&self, subject_id: &str) -> Result<Option<MfaRecord>, BoxError> {
        Ok(self.records.get(subject_id).map(|r| r.clone()))
    }

    async fn save(&self, record: &MfaRecord, expected_version: i64) -> Result<bool, BoxError> {
        match self.records.entry(record.subject_id.clone()) {
            Entry::Occupied(mut row) => {
                if row.get().version != expected_version {
                    return Ok(false);
                }
                row.insert(record.clone());
                Ok(true)
            }
            Entry::Vacant(slot) => {
                if expected_version != 0 {
                    return Ok(false);
                }
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versioned_save() {
        let store = MemoryMfaStore::new();
        let mut record = MfaRecord::new("u1");
        record.version = 1;

        assert!(store.save(&record, 0).await.unwrap());
        assert!(!store.save(&record, 0).await.unwrap());

        let mut next = record.clone();
        next.version = 2;
        assert!(store.save(&next, 1).await.unwrap());
        assert!(!store.save(&next, 1).await.unwrap());
        assert_eq!(store.load("u1").await.unwrap().unwrap().version, 2);
    }
}
