//! Batched mutation with snapshot rollback.

use tracing::debug;

use crate::error::TrieError;
use crate::store::{OverlayDb, TrieDb};
use crate::trie::HexaryTrie;

/// A squash transaction over a trie.
///
/// Mutations stage in an in-memory overlay; the underlying store sees
/// nothing until [`BatchTrie::commit`]. A missing-node fault inside any
/// operation discards the overlay together with the tentative delete set
/// and resets the batch to the root it was opened at, so a later `commit`
/// becomes a no-op. Dropping the batch without committing discards it.
#[derive(Debug)]
pub struct BatchTrie<'a, D: TrieDb> {
    inner: HexaryTrie<OverlayDb<'a, D>>,
    parent_root: &'a mut [u8; 32],
    opened_at: [u8; 32],
}

impl<D: TrieDb> HexaryTrie<D> {
    /// Opens a squash transaction. All mutations batch into a single store
    /// commit; `prune` applies the pruning discipline to the batch as a
    /// whole, with the same ownership caveat as
    /// [`HexaryTrie::with_pruning`].
    pub fn squash_changes(&mut self, prune: bool) -> BatchTrie<'_, D> {
        let (db, parent_root) = self.parts_mut();
        let opened_at = *parent_root;
        BatchTrie {
            inner: HexaryTrie::from_parts(OverlayDb::new(db), opened_at, prune),
            parent_root,
            opened_at,
        }
    }
}

impl<D: TrieDb> BatchTrie<'_, D> {
    /// The root hash as staged by this batch.
    pub fn root_hash(&self) -> [u8; 32] {
        self.inner.root_hash()
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let result = self.inner.get(key);
        self.guard(result)
    }

    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool, TrieError> {
        let result = self.inner.contains_key(key);
        self.guard(result)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        let result = self.inner.set(key, value);
        self.guard(result)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let result = self.inner.delete(key);
        self.guard(result)
    }

    /// Flushes staged writes and deletes to the underlying store and
    /// publishes the batched root. Returns the committed root hash.
    pub fn commit(self) -> [u8; 32] {
        let BatchTrie { inner, parent_root, .. } = self;
        let root = inner.root_hash();
        inner.into_db().commit();
        *parent_root = root;
        root
    }

    fn guard<T>(&mut self, result: Result<T, TrieError>) -> Result<T, TrieError> {
        if let Err(TrieError::MissingTrieNode { .. }) = &result {
            self.rollback();
        }
        result
    }

    fn rollback(&mut self) {
        self.inner.set_root_hash(self.opened_at);
        self.inner.db_mut().discard();
        debug!("squash transaction rolled back on missing node");
    }
}
