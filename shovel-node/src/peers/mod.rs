//! Peer directory
//!
//! Every node keeps its own view of the mesh keyed by display name. Records
//! are added by discovery and by `welcome` announcements and only leave the
//! directory through [`PeerDirectory::forget`].

pub mod discovery;

pub use discovery::discover;

use shovel_core::domain::peer::PeerRecord;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared name → record map
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    inner: Arc<Mutex<BTreeMap<String, PeerRecord>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PeerRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces the record for `record.name`
    pub fn insert(&self, record: PeerRecord) {
        self.lock().insert(record.name.clone(), record);
    }

    /// Inserts `record` unless its name is held by a peer on another port
    ///
    /// On refusal the record keeping the name is returned.
    pub fn admit(&self, record: PeerRecord) -> Result<(), PeerRecord> {
        let mut map = self.lock();
        match map.get(&record.name) {
            Some(existing) if existing.port != record.port => Err(existing.clone()),
            _ => {
                map.insert(record.name.clone(), record);
                Ok(())
            }
        }
    }

    pub fn merge(&self, records: impl IntoIterator<Item = PeerRecord>) {
        let mut map = self.lock();
        for record in records {
            map.insert(record.name.clone(), record);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<PeerRecord> {
        self.lock().get(name).cloned()
    }

    pub fn forget(&self, name: &str) -> Option<PeerRecord> {
        self.lock().remove(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All records, ordered by port
    pub fn records(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.lock().values().cloned().collect();
        records.sort_by_key(|r| r.port);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_upserts_by_name() {
        let directory = PeerDirectory::new();
        directory.insert(PeerRecord::new("beta", 0, 5002));
        directory.merge(vec![
            PeerRecord::new("alpha", 0, 5001),
            PeerRecord::new("beta", 7, 5003),
        ]);

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("beta").unwrap().port, 5003);
        let ports: Vec<u16> = directory.records().iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![5001, 5003]);
    }

    #[test]
    fn test_admit_never_evicts_a_name() {
        let directory = PeerDirectory::new();
        directory.insert(PeerRecord::new("alpha", 0, 5001));

        let refused = directory.admit(PeerRecord::new("alpha", 4, 5009)).unwrap_err();
        assert_eq!(refused.port, 5001);
        assert_eq!(directory.get("alpha").unwrap().port, 5001);

        directory.admit(PeerRecord::new("alpha", 4, 5001)).unwrap();
        assert_eq!(directory.get("alpha").unwrap().id, 4);
        directory.admit(PeerRecord::new("beta", 0, 5002)).unwrap();
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn test_forget_removes_record() {
        let directory = PeerDirectory::new();
        directory.insert(PeerRecord::new("alpha", 0, 5001));
        let clone = directory.clone();

        assert!(clone.forget("alpha").is_some());
        assert!(!directory.contains("alpha"));
        assert!(directory.forget("alpha").is_none());
        assert!(directory.is_empty());
    }
}
