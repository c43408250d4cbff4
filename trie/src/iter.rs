//! Lazy depth-first iteration over the trie.
//!
//! Walkers keep an explicit stack of pending references, so iteration never
//! materializes more of the trie than the spine of the current position.
//! Keys come out in nibble-lexicographic order, which for byte keys is
//! plain lexicographic order.

use nybbles::Nibbles;

use crate::constants::EMPTY_ROOT_HASH;
use crate::nibbles::{concat, pack_nibbles};
use crate::node::{Node, NodeRef};
use crate::store::TrieDb;
use crate::traverse::TraversalError;
use crate::trie::HexaryTrie;

/// Every node reachable from the current root, paired with the nibble
/// prefix it sits at.
pub struct Nodes<'a, D: TrieDb> {
    trie: &'a HexaryTrie<D>,
    pending: Vec<(Nibbles, NodeRef)>,
    faulted: bool,
}

/// `(key, value)` pairs in key order.
pub struct Items<'a, D: TrieDb> {
    nodes: Nodes<'a, D>,
}

/// Keys in order.
pub struct Keys<'a, D: TrieDb> {
    items: Items<'a, D>,
}

/// Values in key order.
pub struct Values<'a, D: TrieDb> {
    items: Items<'a, D>,
}

impl<D: TrieDb> HexaryTrie<D> {
    /// Depth-first walk over all nodes under the current root.
    pub fn nodes(&self) -> Nodes<'_, D> {
        let mut pending = Vec::new();
        if self.root_hash() != EMPTY_ROOT_HASH {
            pending.push((Nibbles::default(), NodeRef::Hash(self.root_hash())));
        }
        Nodes { trie: self, pending, faulted: false }
    }

    pub fn items(&self) -> Items<'_, D> {
        Items { nodes: self.nodes() }
    }

    pub fn keys(&self) -> Keys<'_, D> {
        Keys { items: self.items() }
    }

    pub fn values(&self) -> Values<'_, D> {
        Values { items: self.items() }
    }
}

impl<D: TrieDb> Iterator for Nodes<'_, D> {
    type Item = Result<(Nibbles, Node), TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.faulted {
            return None;
        }
        let (prefix, child) = self.pending.pop()?;
        let node = match child {
            NodeRef::Empty => Node::Blank,
            NodeRef::Inline(node) => *node,
            NodeRef::Hash(digest) => match self.trie.db().get(&digest) {
                None => {
                    self.faulted = true;
                    return Some(Err(TraversalError::MissingNode {
                        missing: digest,
                        prefix,
                    }));
                }
                Some(body) => match Node::from_rlp(&body) {
                    Ok(node) => node,
                    Err(err) => {
                        self.faulted = true;
                        return Some(Err(err.into()));
                    }
                },
            },
        };
        // Queue children right to left so the leftmost slot pops first.
        match &node {
            Node::Extension(ext) => {
                self.pending.push((concat(&prefix, &ext.path), ext.child.clone()));
            }
            Node::Branch(branch) => {
                for (slot, child) in branch.children.iter().enumerate().rev() {
                    if !child.is_empty() {
                        let mut child_prefix = prefix.clone();
                        child_prefix.push(slot as u8);
                        self.pending.push((child_prefix, child.clone()));
                    }
                }
            }
            Node::Leaf(_) | Node::Blank => {}
        }
        Some(Ok((prefix, node)))
    }
}

impl<D: TrieDb> Iterator for Items<'_, D> {
    type Item = Result<(Vec<u8>, Vec<u8>), TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (prefix, node) = match self.nodes.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            let (key_path, value) = match node {
                Node::Leaf(leaf) => (concat(&prefix, &leaf.path), leaf.value),
                Node::Branch(branch) => match branch.value {
                    Some(value) => (prefix, value),
                    None => continue,
                },
                Node::Extension(_) | Node::Blank => continue,
            };
            return Some(match pack_nibbles(&key_path) {
                Some(key) => Ok((key, value)),
                // A terminal at odd depth cannot come from a byte key; the
                // stored body must be corrupt.
                None => Err(TraversalError::Rlp(alloy_rlp::Error::Custom(
                    "terminal at odd nibble depth",
                ))),
            });
        }
    }
}

impl<D: TrieDb> Iterator for Keys<'_, D> {
    type Item = Result<Vec<u8>, TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.items.next()?.map(|(key, _)| key))
    }
}

impl<D: TrieDb> Iterator for Values<'_, D> {
    type Item = Result<Vec<u8>, TraversalError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.items.next()?.map(|(_, value)| value))
    }
}
