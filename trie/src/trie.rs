//! The hexary trie engine.

use std::collections::HashSet;

use nybbles::Nibbles;
use tracing::{debug, trace};

use crate::constants::EMPTY_ROOT_HASH;
use crate::error::TrieError;
use crate::keccak::keccak256;
use crate::nibbles::{concat, prepend};
use crate::node::{BranchNode, ExtensionNode, LeafNode, Node, NodeRef};
use crate::store::TrieDb;

/// Content-addressed hexary Merkle Patricia Trie over a pluggable store.
///
/// The trie object holds only the current root hash and the store handle;
/// every node body lives in the store under the keccak digest of its RLP
/// serialization. The root body is always persisted under its digest, even
/// when short enough to inline; the empty root is never persisted.
///
/// One logical writer is assumed. Readers of a frozen root are safe exactly
/// when the store supports concurrent reads.
#[derive(Debug)]
pub struct HexaryTrie<D: TrieDb> {
    db: D,
    root_hash: [u8; 32],
    prune: bool,
}

/// Tentative delete set of a single mutation.
///
/// Storage keys of superseded bodies collect here and are removed only
/// after the new root is in the store. Keys rewritten by the same mutation
/// are exempt: the body is still referenced by the new trie.
#[derive(Debug, Default)]
struct PruneSet {
    enabled: bool,
    stale: Vec<[u8; 32]>,
    fresh: HashSet<[u8; 32]>,
}

impl PruneSet {
    fn new(enabled: bool) -> Self {
        Self { enabled, ..Default::default() }
    }

    fn mark_stale(&mut self, child: &NodeRef) {
        if self.enabled {
            if let Some(digest) = child.as_hash() {
                self.stale.push(digest);
            }
        }
    }

    fn mark_stale_hash(&mut self, digest: [u8; 32]) {
        if self.enabled {
            self.stale.push(digest);
        }
    }

    fn mark_fresh(&mut self, digest: [u8; 32]) {
        if self.enabled {
            self.fresh.insert(digest);
        }
    }

    fn flush<D: TrieDb>(self, db: &mut D) {
        if !self.enabled || self.stale.is_empty() {
            return;
        }
        let mut removed = 0usize;
        for digest in &self.stale {
            if !self.fresh.contains(digest) {
                db.remove(digest);
                removed += 1;
            }
        }
        debug!(removed, "pruned superseded trie nodes");
    }
}

impl<D: TrieDb> HexaryTrie<D> {
    /// Creates an empty trie over `db`.
    pub fn new(db: D) -> Self {
        Self { db, root_hash: EMPTY_ROOT_HASH, prune: false }
    }

    /// Opens an existing trie at `root_hash`.
    pub fn at_root(db: D, root_hash: [u8; 32]) -> Self {
        Self { db, root_hash, prune: false }
    }

    /// Enables deletion of superseded node bodies after each mutation.
    ///
    /// Only safe against a freshly populated store whose residency is owned
    /// by this trie alone. Two logical positions referencing the same
    /// content-addressed body share one store entry, so pruning a position
    /// can delete a body that an earlier epoch still reaches.
    pub fn with_pruning(mut self) -> Self {
        self.prune = true;
        self
    }

    /// The 32-byte digest committing to the current key-value map.
    pub fn root_hash(&self) -> [u8; 32] {
        self.root_hash
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_db(self) -> D {
        self.db
    }

    pub(crate) fn from_parts(db: D, root_hash: [u8; 32], prune: bool) -> Self {
        Self { db, root_hash, prune }
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut D, &mut [u8; 32]) {
        (&mut self.db, &mut self.root_hash)
    }

    pub(crate) fn set_root_hash(&mut self, root_hash: [u8; 32]) {
        self.root_hash = root_hash;
    }

    /// Looks up `key`. `None` means the key is absent; the empty value is
    /// never stored.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        let path = Nibbles::unpack(key);
        let mut node = self.root_node_for_read(key)?;
        let mut at = 0;
        loop {
            match node {
                Node::Blank => return Ok(None),
                Node::Leaf(leaf) => {
                    return if &path[at..] == &leaf.path[..] {
                        Ok(Some(leaf.value))
                    } else {
                        Ok(None)
                    };
                }
                Node::Extension(ext) => {
                    if !path[at..].starts_with(&ext.path) {
                        return Ok(None);
                    }
                    at += ext.path.len();
                    node = self.resolve_for_read(&ext.child, key, &path, at)?;
                }
                Node::Branch(mut branch) => {
                    if at == path.len() {
                        return Ok(branch.value.take());
                    }
                    let slot = path[at] as usize;
                    at += 1;
                    node = self.resolve_for_read(&branch.children[slot], key, &path, at)?;
                }
            }
        }
    }

    /// Whether `key` maps to a value.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }

    /// Inserts or updates `key`. Setting the empty value deletes the key.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        if value.is_empty() {
            return self.delete(key);
        }
        let path = Nibbles::unpack(key);
        let mut prunes = PruneSet::new(self.prune);
        let root = self.root_node_for_write(key, &mut prunes)?;
        let new_root = self.set_at(root, &path, 0, value, key, &mut prunes)?;
        self.commit_root(new_root, &mut prunes);
        prunes.flush(&mut self.db);
        Ok(())
    }

    /// Removes `key`. Deleting an absent key touches neither the store nor
    /// the root.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        let existing = match self.get(key) {
            Ok(existing) => existing,
            // Mutations report the traversed prefix as unknown.
            Err(TrieError::MissingTrieNode { missing, root, key, .. }) => {
                return Err(TrieError::MissingTrieNode { missing, root, key, prefix: None })
            }
            Err(err) => return Err(err),
        };
        if existing.is_none() {
            return Ok(());
        }
        let path = Nibbles::unpack(key);
        let mut prunes = PruneSet::new(self.prune);
        let root = self.root_node_for_write(key, &mut prunes)?;
        let new_root = self.delete_at(root, &path, 0, key, &mut prunes)?;
        self.commit_root(new_root, &mut prunes);
        prunes.flush(&mut self.db);
        Ok(())
    }

    fn root_node_for_read(&self, key: &[u8]) -> Result<Node, TrieError> {
        if self.root_hash == EMPTY_ROOT_HASH {
            return Ok(Node::Blank);
        }
        let body = self.db.get(&self.root_hash).ok_or(TrieError::MissingTrieNode {
            missing: self.root_hash,
            root: self.root_hash,
            key: key.to_vec(),
            prefix: Some(Nibbles::default()),
        })?;
        Ok(Node::from_rlp(&body)?)
    }

    fn root_node_for_write(&self, key: &[u8], prunes: &mut PruneSet) -> Result<Node, TrieError> {
        if self.root_hash == EMPTY_ROOT_HASH {
            return Ok(Node::Blank);
        }
        let body = self
            .db
            .get(&self.root_hash)
            .ok_or_else(|| self.missing(self.root_hash, key))?;
        prunes.mark_stale_hash(self.root_hash);
        Ok(Node::from_rlp(&body)?)
    }

    fn missing(&self, digest: [u8; 32], key: &[u8]) -> TrieError {
        TrieError::MissingTrieNode {
            missing: digest,
            root: self.root_hash,
            key: key.to_vec(),
            prefix: None,
        }
    }

    fn resolve_for_read(
        &self,
        child: &NodeRef,
        key: &[u8],
        path: &Nibbles,
        at: usize,
    ) -> Result<Node, TrieError> {
        match child {
            NodeRef::Empty => Ok(Node::Blank),
            NodeRef::Inline(node) => Ok((**node).clone()),
            NodeRef::Hash(digest) => {
                let body = self.db.get(digest).ok_or_else(|| TrieError::MissingTrieNode {
                    missing: *digest,
                    root: self.root_hash,
                    key: key.to_vec(),
                    prefix: Some(path.slice(..at)),
                })?;
                Ok(Node::from_rlp(&body)?)
            }
        }
    }

    fn resolve_for_write(&self, child: &NodeRef, key: &[u8]) -> Result<Node, TrieError> {
        match child {
            NodeRef::Empty => Ok(Node::Blank),
            NodeRef::Inline(node) => Ok((**node).clone()),
            NodeRef::Hash(digest) => {
                let body = self.db.get(digest).ok_or_else(|| self.missing(*digest, key))?;
                Ok(Node::from_rlp(&body)?)
            }
        }
    }

    /// Persists a rebuilt subtree and returns the reference its parent
    /// should embed.
    fn commit_node(&mut self, node: Node, prunes: &mut PruneSet) -> NodeRef {
        let (child, persist) = NodeRef::from_node(node);
        if let Some((digest, body)) = persist {
            self.db.insert(digest, body);
            prunes.mark_fresh(digest);
        }
        child
    }

    fn commit_root(&mut self, root: Node, prunes: &mut PruneSet) {
        match root {
            Node::Blank => {
                self.root_hash = EMPTY_ROOT_HASH;
            }
            node => {
                let body = node.to_rlp();
                let digest = keccak256(&body);
                self.db.insert(digest, body);
                prunes.mark_fresh(digest);
                self.root_hash = digest;
            }
        }
        trace!(root = %hex::encode(self.root_hash), "committed trie root");
    }

    fn set_at(
        &mut self,
        node: Node,
        path: &Nibbles,
        at: usize,
        value: &[u8],
        key: &[u8],
        prunes: &mut PruneSet,
    ) -> Result<Node, TrieError> {
        match node {
            Node::Blank => Ok(Node::Leaf(LeafNode::new(path.slice(at..), value.to_vec()))),
            Node::Leaf(leaf) => Ok(self.set_in_leaf(leaf, path, at, value, prunes)),
            Node::Extension(ext) => self.set_in_extension(ext, path, at, value, key, prunes),
            Node::Branch(mut branch) => {
                if at == path.len() {
                    branch.value = Some(value.to_vec());
                    return Ok(Node::Branch(branch));
                }
                let slot = path[at] as usize;
                let child_ref = std::mem::take(&mut branch.children[slot]);
                let child = self.resolve_for_write(&child_ref, key)?;
                prunes.mark_stale(&child_ref);
                let new_child = self.set_at(child, path, at + 1, value, key, prunes)?;
                branch.children[slot] = self.commit_node(new_child, prunes);
                Ok(Node::Branch(branch))
            }
        }
    }

    fn set_in_leaf(
        &mut self,
        leaf: LeafNode,
        path: &Nibbles,
        at: usize,
        value: &[u8],
        prunes: &mut PruneSet,
    ) -> Node {
        let remaining = path.slice(at..);
        if remaining == leaf.path {
            return Node::Leaf(LeafNode::new(leaf.path, value.to_vec()));
        }

        // Divergent suffixes: split at the shared prefix and fan out.
        let common = remaining.common_prefix_length(&leaf.path);
        let mut branch = BranchNode::default();
        let old_rest = leaf.path.slice(common..);
        if old_rest.is_empty() {
            branch.value = Some(leaf.value);
        } else {
            let slot = old_rest[0] as usize;
            let tail = Node::Leaf(LeafNode::new(old_rest.slice(1..), leaf.value));
            branch.children[slot] = self.commit_node(tail, prunes);
        }
        let new_rest = remaining.slice(common..);
        if new_rest.is_empty() {
            branch.value = Some(value.to_vec());
        } else {
            let slot = new_rest[0] as usize;
            let tail = Node::Leaf(LeafNode::new(new_rest.slice(1..), value.to_vec()));
            branch.children[slot] = self.commit_node(tail, prunes);
        }
        let branch = Node::Branch(branch);
        if common == 0 {
            branch
        } else {
            let child = self.commit_node(branch, prunes);
            Node::Extension(ExtensionNode::new(remaining.slice(..common), child))
        }
    }

    fn set_in_extension(
        &mut self,
        ext: ExtensionNode,
        path: &Nibbles,
        at: usize,
        value: &[u8],
        key: &[u8],
        prunes: &mut PruneSet,
    ) -> Result<Node, TrieError> {
        let remaining = path.slice(at..);
        if remaining.starts_with(&ext.path) {
            let child = self.resolve_for_write(&ext.child, key)?;
            prunes.mark_stale(&ext.child);
            let new_child = self.set_at(child, path, at + ext.path.len(), value, key, prunes)?;
            let child_ref = self.commit_node(new_child, prunes);
            return Ok(Node::Extension(ExtensionNode::new(ext.path, child_ref)));
        }

        // The key leaves the segment early: split at the shared prefix. A
        // one-nibble remainder drops the extension entirely, its child goes
        // straight into the branch slot.
        let common = remaining.common_prefix_length(&ext.path);
        let mut branch = BranchNode::default();
        let ext_rest = ext.path.slice(common..);
        let slot = ext_rest[0] as usize;
        branch.children[slot] = if ext_rest.len() == 1 {
            ext.child
        } else {
            let tail = Node::Extension(ExtensionNode::new(ext_rest.slice(1..), ext.child));
            self.commit_node(tail, prunes)
        };
        let new_rest = remaining.slice(common..);
        if new_rest.is_empty() {
            branch.value = Some(value.to_vec());
        } else {
            let slot = new_rest[0] as usize;
            let tail = Node::Leaf(LeafNode::new(new_rest.slice(1..), value.to_vec()));
            branch.children[slot] = self.commit_node(tail, prunes);
        }
        let branch = Node::Branch(branch);
        if common == 0 {
            Ok(branch)
        } else {
            let child_ref = self.commit_node(branch, prunes);
            Ok(Node::Extension(ExtensionNode::new(remaining.slice(..common), child_ref)))
        }
    }

    fn delete_at(
        &mut self,
        node: Node,
        path: &Nibbles,
        at: usize,
        key: &[u8],
        prunes: &mut PruneSet,
    ) -> Result<Node, TrieError> {
        match node {
            Node::Blank => Ok(Node::Blank),
            Node::Leaf(leaf) => {
                if &path[at..] == &leaf.path[..] {
                    Ok(Node::Blank)
                } else {
                    Ok(Node::Leaf(leaf))
                }
            }
            Node::Extension(ext) => {
                if !path[at..].starts_with(&ext.path) {
                    return Ok(Node::Extension(ext));
                }
                let child = self.resolve_for_write(&ext.child, key)?;
                prunes.mark_stale(&ext.child);
                let new_child = self.delete_at(child, path, at + ext.path.len(), key, prunes)?;
                self.fold_extension(ext.path, new_child, prunes)
            }
            Node::Branch(mut branch) => {
                if at == path.len() {
                    branch.value = None;
                } else {
                    let slot = path[at] as usize;
                    let child_ref = std::mem::take(&mut branch.children[slot]);
                    let child = self.resolve_for_write(&child_ref, key)?;
                    prunes.mark_stale(&child_ref);
                    let new_child = self.delete_at(child, path, at + 1, key, prunes)?;
                    branch.children[slot] = self.commit_node(new_child, prunes);
                }
                self.fold_branch(branch, key, prunes)
            }
        }
    }

    /// Restores canonical form for an extension whose child was rebuilt.
    fn fold_extension(
        &mut self,
        path: Nibbles,
        child: Node,
        prunes: &mut PruneSet,
    ) -> Result<Node, TrieError> {
        match child {
            Node::Blank => Ok(Node::Blank),
            Node::Leaf(leaf) => Ok(Node::Leaf(LeafNode::new(
                concat(&path, &leaf.path),
                leaf.value,
            ))),
            Node::Extension(sub) => Ok(Node::Extension(ExtensionNode::new(
                concat(&path, &sub.path),
                sub.child,
            ))),
            branch @ Node::Branch(_) => {
                let child_ref = self.commit_node(branch, prunes);
                Ok(Node::Extension(ExtensionNode::new(path, child_ref)))
            }
        }
    }

    /// Restores canonical form for a branch after a slot or its value was
    /// cleared.
    fn fold_branch(
        &mut self,
        branch: BranchNode,
        key: &[u8],
        prunes: &mut PruneSet,
    ) -> Result<Node, TrieError> {
        let occupied = branch.child_count();
        if occupied >= 2 || (occupied == 1 && branch.value.is_some()) {
            return Ok(Node::Branch(branch));
        }
        if occupied == 0 {
            return Ok(match branch.value {
                Some(value) => Node::Leaf(LeafNode::new(Nibbles::default(), value)),
                None => Node::Blank,
            });
        }

        // One child and no value: the branch dissolves into the child, which
        // absorbs the slot nibble.
        let (slot, child_ref) = branch
            .children
            .into_iter()
            .enumerate()
            .find(|(_, child)| !child.is_empty())
            .ok_or(TrieError::BadTrieInvariant("branch lost its last child"))?;
        let nibble = slot as u8;
        match self.resolve_for_write(&child_ref, key)? {
            Node::Blank => Err(TrieError::BadTrieInvariant("branch slot resolved to a blank node")),
            Node::Leaf(leaf) => {
                prunes.mark_stale(&child_ref);
                Ok(Node::Leaf(LeafNode::new(prepend(nibble, &leaf.path), leaf.value)))
            }
            Node::Extension(sub) => {
                prunes.mark_stale(&child_ref);
                Ok(Node::Extension(ExtensionNode::new(
                    prepend(nibble, &sub.path),
                    sub.child,
                )))
            }
            Node::Branch(_) => {
                let mut path = Nibbles::with_capacity(1);
                path.push(nibble);
                Ok(Node::Extension(ExtensionNode::new(path, child_ref)))
            }
        }
    }
}
