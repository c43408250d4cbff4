//! Root-down inspection of the trie with annotated results.

use core::fmt;

use nybbles::Nibbles;

use crate::constants::{CHILD_INDEX_RANGE, EMPTY_ROOT_HASH};
use crate::node::{ExtensionNode, LeafNode, Node, NodeRef};
use crate::store::TrieDb;
use crate::trie::HexaryTrie;

/// A node as seen by a walker, with its outgoing edges made explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedNode {
    /// Nibble segments leading out of this node: a single-nibble segment
    /// per occupied branch slot, the full path of an extension, nothing for
    /// a leaf or blank node.
    pub sub_segments: Vec<Nibbles>,
    /// Terminal value when this node ends a key.
    pub value: Option<Vec<u8>>,
    /// Remaining key suffix of a leaf.
    pub suffix: Nibbles,
    /// The decoded node body.
    pub raw: Node,
}

impl AnnotatedNode {
    /// Annotates a decoded node.
    pub fn from_node(node: Node) -> Self {
        let (sub_segments, value, suffix) = match &node {
            Node::Blank => (Vec::new(), None, Nibbles::default()),
            Node::Leaf(leaf) => (Vec::new(), Some(leaf.value.clone()), leaf.path.clone()),
            Node::Extension(ext) => (vec![ext.path.clone()], None, Nibbles::default()),
            Node::Branch(branch) => {
                let mut segments = Vec::new();
                for slot in CHILD_INDEX_RANGE {
                    if !branch.children[slot as usize].is_empty() {
                        segments.push(Nibbles::from_nibbles([slot]));
                    }
                }
                (segments, branch.value.clone(), Nibbles::default())
            }
        };
        Self { sub_segments, value, suffix, raw: node }
    }
}

/// Traversal stopped strictly inside the compact path of a leaf or
/// extension.
///
/// The segment past the stopping point is reported as a standalone
/// simulated node so a walker can keep exploring from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTraversal {
    /// Nibbles of the requested path consumed before entering the segment.
    pub consumed: Nibbles,
    /// Unconsumed remainder of the segment the path stopped in.
    pub untraversed_tail: Nibbles,
    /// The tail sliced off at the stopping point, annotated.
    pub simulated_node: AnnotatedNode,
}

/// Failures surfaced by [`HexaryTrie::traverse`] and
/// [`HexaryTrie::traverse_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalError {
    /// A referenced node body was not in the store. Traversal has no user
    /// key to report, only the prefix walked from the root.
    MissingNode {
        missing: [u8; 32],
        prefix: Nibbles,
    },
    /// Non-fatal: the requested path ends inside a compact path segment.
    PartialPath(PartialTraversal),
    /// A stored node body failed to decode.
    Rlp(alloy_rlp::Error),
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode { missing, prefix } => write!(
                f,
                "missing trie node {} at prefix {:?}",
                hex::encode_prefixed(missing),
                prefix,
            ),
            Self::PartialPath(partial) => write!(
                f,
                "traversal stopped inside a path segment, {:?} left untraversed",
                partial.untraversed_tail,
            ),
            Self::Rlp(err) => write!(f, "undecodable node body: {err}"),
        }
    }
}

impl std::error::Error for TraversalError {}

impl From<alloy_rlp::Error> for TraversalError {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Rlp(err)
    }
}

impl<D: TrieDb> HexaryTrie<D> {
    /// Walks `path` from the root and annotates the node it lands on.
    ///
    /// Landing on nothing (an empty slot or a divergent segment) annotates
    /// a blank node, mirroring a lookup of an absent key.
    pub fn traverse(&self, path: &Nibbles) -> Result<AnnotatedNode, TraversalError> {
        let root = if self.root_hash() == EMPTY_ROOT_HASH {
            Node::Blank
        } else {
            self.read_for_traversal(self.root_hash(), Nibbles::default())?
        };
        self.traverse_at(root, path)
    }

    /// Walks `path` starting from an already decoded node body, saving the
    /// root-down store reads. Used together with a frontier cache.
    pub fn traverse_from(&self, node: &Node, path: &Nibbles) -> Result<AnnotatedNode, TraversalError> {
        self.traverse_at(node.clone(), path)
    }

    fn traverse_at(&self, mut node: Node, path: &Nibbles) -> Result<AnnotatedNode, TraversalError> {
        let mut at = 0;
        loop {
            if at == path.len() {
                return Ok(AnnotatedNode::from_node(node));
            }
            match node {
                Node::Blank => return Ok(AnnotatedNode::from_node(Node::Blank)),
                Node::Leaf(leaf) => {
                    let remaining = path.slice(at..);
                    return if remaining == leaf.path {
                        // Consumed the whole suffix: report the terminal.
                        Ok(AnnotatedNode::from_node(Node::Leaf(LeafNode::new(
                            Nibbles::default(),
                            leaf.value,
                        ))))
                    } else if leaf.path.starts_with(&remaining) {
                        Err(TraversalError::PartialPath(PartialTraversal {
                            consumed: path.slice(..at),
                            untraversed_tail: leaf.path.slice(remaining.len()..),
                            simulated_node: AnnotatedNode::from_node(Node::Leaf(LeafNode::new(
                                leaf.path.slice(remaining.len()..),
                                leaf.value,
                            ))),
                        }))
                    } else {
                        Ok(AnnotatedNode::from_node(Node::Blank))
                    };
                }
                Node::Extension(ext) => {
                    let remaining = path.slice(at..);
                    if remaining.starts_with(&ext.path) {
                        at += ext.path.len();
                        node = self.child_for_traversal(&ext.child, path, at)?;
                    } else if ext.path.starts_with(&remaining) {
                        // Strictly inside the segment; equal length is the
                        // starts_with case above.
                        return Err(TraversalError::PartialPath(PartialTraversal {
                            consumed: path.slice(..at),
                            untraversed_tail: ext.path.slice(remaining.len()..),
                            simulated_node: AnnotatedNode::from_node(Node::Extension(
                                ExtensionNode::new(ext.path.slice(remaining.len()..), ext.child),
                            )),
                        }));
                    } else {
                        return Ok(AnnotatedNode::from_node(Node::Blank));
                    }
                }
                Node::Branch(mut branch) => {
                    let slot = path[at] as usize;
                    at += 1;
                    let child = std::mem::take(&mut branch.children[slot]);
                    node = self.child_for_traversal(&child, path, at)?;
                }
            }
        }
    }

    fn child_for_traversal(
        &self,
        child: &NodeRef,
        path: &Nibbles,
        at: usize,
    ) -> Result<Node, TraversalError> {
        match child {
            NodeRef::Empty => Ok(Node::Blank),
            NodeRef::Inline(node) => Ok((**node).clone()),
            NodeRef::Hash(digest) => self.read_for_traversal(*digest, path.slice(..at)),
        }
    }

    fn read_for_traversal(&self, digest: [u8; 32], prefix: Nibbles) -> Result<Node, TraversalError> {
        let body = self
            .db()
            .get(&digest)
            .ok_or(TraversalError::MissingNode { missing: digest, prefix })?;
        Ok(Node::from_rlp(&body)?)
    }
}
