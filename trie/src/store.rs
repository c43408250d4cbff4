//! Backing node store abstraction.

use std::collections::{HashMap, HashSet};

/// Byte-addressable node store.
///
/// Bodies are keyed by the 32-byte keccak digest of their RLP serialization,
/// so the store holds at most one entry per distinct body regardless of how
/// many positions reference it.
pub trait TrieDb {
    /// Reads a node body.
    fn get(&self, key: &[u8; 32]) -> Option<Vec<u8>>;

    /// Writes a node body.
    fn insert(&mut self, key: [u8; 32], body: Vec<u8>);

    /// Removes a node body. Best-effort and idempotent: removing an absent
    /// key does nothing.
    fn remove(&mut self, key: &[u8; 32]);

    /// Membership check.
    fn contains(&self, key: &[u8; 32]) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory store backed by a hash map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDb {
    entries: HashMap<[u8; 32], Vec<u8>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Storage keys currently resident.
    pub fn keys(&self) -> impl Iterator<Item = &[u8; 32]> {
        self.entries.keys()
    }
}

impl TrieDb for MemoryDb {
    fn get(&self, key: &[u8; 32]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: [u8; 32], body: Vec<u8>) {
        self.entries.insert(key, body);
    }

    fn remove(&mut self, key: &[u8; 32]) {
        self.entries.remove(key);
    }

    fn contains(&self, key: &[u8; 32]) -> bool {
        self.entries.contains_key(key)
    }
}

/// Staging view over a borrowed store.
///
/// Writes and removals accumulate in memory and reach the underlying store
/// only on [`OverlayDb::commit`]; reads fall through for anything not staged.
/// Backs the squash transaction.
#[derive(Debug)]
pub struct OverlayDb<'a, D: TrieDb> {
    inner: &'a mut D,
    staged: HashMap<[u8; 32], Vec<u8>>,
    doomed: HashSet<[u8; 32]>,
}

impl<'a, D: TrieDb> OverlayDb<'a, D> {
    pub(crate) fn new(inner: &'a mut D) -> Self {
        Self {
            inner,
            staged: HashMap::new(),
            doomed: HashSet::new(),
        }
    }

    /// Applies staged writes, then staged removals, to the underlying store.
    pub(crate) fn commit(self) {
        let Self { inner, staged, doomed } = self;
        for (key, body) in staged {
            inner.insert(key, body);
        }
        for key in doomed {
            inner.remove(&key);
        }
    }

    /// Drops everything staged since creation or the last commit.
    pub(crate) fn discard(&mut self) {
        self.staged.clear();
        self.doomed.clear();
    }
}

impl<D: TrieDb> TrieDb for OverlayDb<'_, D> {
    fn get(&self, key: &[u8; 32]) -> Option<Vec<u8>> {
        if let Some(body) = self.staged.get(key) {
            return Some(body.clone());
        }
        if self.doomed.contains(key) {
            return None;
        }
        self.inner.get(key)
    }

    fn insert(&mut self, key: [u8; 32], body: Vec<u8>) {
        self.doomed.remove(&key);
        self.staged.insert(key, body);
    }

    fn remove(&mut self, key: &[u8; 32]) {
        self.staged.remove(key);
        self.doomed.insert(*key);
    }
}
