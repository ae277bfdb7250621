//! Lock-guarded map from [`AnchorKey`] to [`AnchorRecord`].
//!
//! A single table keyed by the composite key, plus one secondary index per
//! namespace so lookups by a lone id stay O(1). The 1:1 pairing invariant
//! is enforced on insert: a new key evicts any record that shares its local
//! or remote id.
//!
//! Reads take the lock with `read_recursive`, so a reader already holding a
//! read guard higher up the stack cannot deadlock against a queued writer.
//! Mutating callbacks (`with_remote_mut`) run under the write lock and must
//! not call back into the registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::catalog::LocationEntry;
use crate::render::LocationMarker;

use super::record::AnchorRecord;
use super::types::{AnchorKey, LocalAnchorId, RemoteAnchorId};

/// Generation counter bumped by every [`AnchorRegistry::clear`].
///
/// Resolution completions capture the generation at dispatch time; an insert
/// carrying an older generation is refused.
pub type Generation = u64;

#[derive(Default)]
struct Inner {
    records: HashMap<AnchorKey, AnchorRecord>,
    by_local: HashMap<LocalAnchorId, AnchorKey>,
    by_remote: HashMap<RemoteAnchorId, AnchorKey>,
    generation: Generation,
}

impl Inner {
    fn keys_touching(&self, id: Uuid) -> Vec<AnchorKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(key) = self.by_local.get(&LocalAnchorId(id)) {
            keys.push(*key);
        }
        if let Some(key) = self.by_remote.get(&RemoteAnchorId(id)) {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        keys
    }

    fn remove_key(&mut self, key: &AnchorKey) -> Option<AnchorRecord> {
        let record = self.records.remove(key)?;
        self.by_local.remove(&key.local);
        self.by_remote.remove(&key.remote);
        Some(record)
    }

    fn insert(&mut self, key: AnchorKey, record: AnchorRecord) -> Vec<AnchorRecord> {
        let mut evicted = Vec::new();

        // Same key: plain overwrite.
        if let Some(prev) = self.remove_key(&key) {
            evicted.push(prev);
        }
        // Conflicting pairings on either side.
        let conflicts: Vec<AnchorKey> = [
            self.by_local.get(&key.local).copied(),
            self.by_remote.get(&key.remote).copied(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for other in conflicts {
            if let Some(prev) = self.remove_key(&other) {
                evicted.push(prev);
            }
        }

        self.by_local.insert(key.local, key);
        self.by_remote.insert(key.remote, key);
        self.records.insert(key, record);
        evicted
    }
}

/// Thread-safe anchor store shared by the frame loop and resolution
/// completions.
#[derive(Default)]
pub struct AnchorRegistry {
    inner: RwLock<Inner>,
}

impl AnchorRegistry {
    /// Create an empty registry at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `key`, overwriting any record with the same key.
    ///
    /// Returns every record evicted by the write: the previous record for
    /// `key` and any record whose key shared one of `key`'s ids.
    pub fn insert(&self, key: AnchorKey, record: AnchorRecord) -> Vec<AnchorRecord> {
        self.inner.write().insert(key, record)
    }

    /// Insert only if no clear has happened since `generation` was read.
    ///
    /// On a stale generation the record is handed back untouched.
    pub fn insert_if_current(
        &self,
        generation: Generation,
        key: AnchorKey,
        record: AnchorRecord,
    ) -> Result<Vec<AnchorRecord>, AnchorRecord> {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return Err(record);
        }
        Ok(inner.insert(key, record))
    }

    /// All records whose local or remote id equals `id`.
    pub fn lookup(&self, id: impl Into<Uuid>) -> Vec<AnchorRecord> {
        let id = id.into();
        let inner = self.inner.read_recursive();
        inner
            .keys_touching(id)
            .iter()
            .filter_map(|key| inner.records.get(key).cloned())
            .collect()
    }

    /// The record stored under exactly this id pair.
    pub fn lookup_exact(&self, local: LocalAnchorId, remote: RemoteAnchorId) -> Option<AnchorRecord> {
        self.inner
            .read_recursive()
            .records
            .get(&AnchorKey::new(local, remote))
            .cloned()
    }

    /// Whether any record's local or remote id equals `id`.
    pub fn contains(&self, id: impl Into<Uuid>) -> bool {
        let id = id.into();
        !self.inner.read_recursive().keys_touching(id).is_empty()
    }

    /// Remove every record whose key touches `id`.
    pub fn remove_all(&self, id: impl Into<Uuid>) -> Vec<AnchorRecord> {
        let id = id.into();
        let mut inner = self.inner.write();
        let keys = inner.keys_touching(id);
        keys.iter().filter_map(|key| inner.remove_key(key)).collect()
    }

    /// Remove everything and invalidate in-flight inserts.
    pub fn clear(&self) -> Vec<AnchorRecord> {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.by_local.clear();
        inner.by_remote.clear();
        inner.records.drain().map(|(_, record)| record).collect()
    }

    /// Current generation. Bumped by every [`AnchorRegistry::clear`].
    pub fn generation(&self) -> Generation {
        self.inner.read_recursive().generation
    }

    /// Mutate the record paired with `remote` under the write lock.
    pub fn with_remote_mut<R>(
        &self,
        remote: RemoteAnchorId,
        f: impl FnOnce(&mut AnchorRecord) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.write();
        let key = *inner.by_remote.get(&remote)?;
        inner.records.get_mut(&key).map(f)
    }

    /// Remote ids of every stored record.
    pub fn remote_ids(&self) -> Vec<RemoteAnchorId> {
        self.inner.read_recursive().by_remote.keys().copied().collect()
    }

    /// Copies of every key and record.
    pub fn snapshot(&self) -> Vec<(AnchorKey, AnchorRecord)> {
        self.inner
            .read_recursive()
            .records
            .iter()
            .map(|(key, record)| (*key, record.clone()))
            .collect()
    }

    /// Catalog entry of the first record touching `id`.
    pub fn location_for(&self, id: impl Into<Uuid>) -> Option<LocationEntry> {
        self.lookup(id).into_iter().next().map(|r| r.location)
    }

    /// Marker of the first record touching `id`.
    pub fn marker_for(&self, id: impl Into<Uuid>) -> Option<LocationMarker> {
        self.lookup(id).into_iter().next().map(|r| r.marker)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read_recursive().records.len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
