//! Record storage.
//!
//! The engine only talks to [`KeyStore`]. [`MemoryStore`] keeps everything
//! in a sharded concurrent map; a durable backend can sit behind the same
//! trait.

use crate::vault::record::{CredentialRecord, KeyId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage operations the vault needs.
///
/// `read` and `update` run their closure while holding the record
/// exclusively (for `update`) or shared (for `read`); the closure must not
/// call back into the store.
pub trait KeyStore: Send + Sync {
    /// Next insertion sequence number.
    fn next_seq(&self) -> u64;

    /// Insert or replace a record, returning the previous one.
    fn insert(&self, record: CredentialRecord) -> Option<CredentialRecord>;

    /// Remove a record.
    fn remove(&self, id: &str) -> Option<CredentialRecord>;

    fn read<R, F>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&CredentialRecord) -> R;

    fn update<R, F>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut CredentialRecord) -> R;

    /// Apply `update` if `id` exists, otherwise insert `create(seq)`.
    /// Returns true when an existing record was updated.
    fn upsert<U, C>(&self, id: &str, update: U, create: C) -> bool
    where
        U: FnOnce(&mut CredentialRecord),
        C: FnOnce(u64) -> CredentialRecord;

    /// Visit every record and collect the `Some` results in insertion order.
    fn scan<R, F>(&self, f: F) -> Vec<R>
    where
        F: FnMut(&CredentialRecord) -> Option<R>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store. Conflicting operations on one record serialize on
/// the owning shard's lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<KeyId, CredentialRecord>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryStore {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, record: CredentialRecord) -> Option<CredentialRecord> {
        self.records.insert(record.id.clone(), record)
    }

    fn remove(&self, id: &str) -> Option<CredentialRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    fn read<R, F>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&CredentialRecord) -> R,
    {
        self.records.get(id).map(|record| f(record.value()))
    }

    fn update<R, F>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut CredentialRecord) -> R,
    {
        self.records
            .get_mut(id)
            .map(|mut record| f(record.value_mut()))
    }

    fn upsert<U, C>(&self, id: &str, update: U, create: C) -> bool
    where
        U: FnOnce(&mut CredentialRecord),
        C: FnOnce(u64) -> CredentialRecord,
    {
        match self.records.entry(id.to_owned()) {
            Entry::Occupied(mut entry) => {
                update(entry.get_mut());
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(create(self.next_seq()));
                false
            }
        }
    }

    fn scan<R, F>(&self, mut f: F) -> Vec<R>
    where
        F: FnMut(&CredentialRecord) -> Option<R>,
    {
        let mut hits: Vec<(u64, R)> = self
            .records
            .iter()
            .filter_map(|entry| f(entry.value()).map(|r| (entry.seq, r)))
            .collect();
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, r)| r).collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
