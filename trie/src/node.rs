//! Typed trie nodes and their RLP codec.
//!
//! A node body is one of three RLP shapes: the empty string (absence), a
//! two-item list (leaf or extension, told apart by the hex-prefix flag on
//! the first item) or a seventeen-item list (branch). A child is referenced
//! either by the keccak digest of its body or, when that body is strictly
//! shorter than 32 bytes, by embedding the body in place. The inlining rule
//! is bit-exact: it is what makes root hashes line up with other
//! implementations.

use core::fmt;

use alloy_rlp::{Decodable, Encodable, Header, PayloadView, EMPTY_STRING_CODE};
use arrayvec::ArrayVec;
use bytes::BufMut;
use nybbles::Nibbles;

use crate::keccak::keccak256;
use crate::nibbles::{compact_decode, compact_encode};

/// Reference from a parent node to a child.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum NodeRef {
    /// No child in this slot.
    #[default]
    Empty,
    /// Child stored out of line under the keccak digest of its body.
    Hash([u8; 32]),
    /// Child embedded in place; its body is shorter than 32 bytes.
    Inline(Box<Node>),
}

impl NodeRef {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The storage key when the child is stored out of line.
    #[inline]
    pub fn as_hash(&self) -> Option<[u8; 32]> {
        match self {
            Self::Hash(digest) => Some(*digest),
            _ => None,
        }
    }

    /// Turns a freshly built node into its reference form.
    ///
    /// Bodies shorter than 32 bytes embed in place and need no store entry;
    /// anything else is addressed by digest and the returned `(digest,
    /// body)` pair must be persisted by the caller. `Blank` collapses to
    /// [`NodeRef::Empty`].
    pub fn from_node(node: Node) -> (Self, Option<([u8; 32], Vec<u8>)>) {
        if matches!(node, Node::Blank) {
            return (Self::Empty, None);
        }
        let body = node.to_rlp();
        if body.len() < 32 {
            (Self::Inline(Box::new(node)), None)
        } else {
            let digest = keccak256(&body);
            (Self::Hash(digest), Some((digest, body)))
        }
    }

    /// The raw RLP item of this reference as it appears inside a parent
    /// body. At most 33 bytes.
    pub fn as_rlp_item(&self) -> ArrayVec<u8, 33> {
        let mut out = ArrayVec::new();
        match self {
            Self::Empty => out.push(EMPTY_STRING_CODE),
            Self::Hash(digest) => {
                out.push(EMPTY_STRING_CODE + 32);
                out.extend(digest.iter().copied());
            }
            Self::Inline(node) => out.extend(node.to_rlp()),
        }
        out
    }

    /// Parses a child slot from its raw RLP item.
    pub(crate) fn from_raw_rlp(item: &[u8]) -> alloy_rlp::Result<Self> {
        match item.first() {
            None => Err(alloy_rlp::Error::InputTooShort),
            Some(&EMPTY_STRING_CODE) if item.len() == 1 => Ok(Self::Empty),
            Some(&first) if first >= 0xc0 => {
                if item.len() >= 32 {
                    return Err(alloy_rlp::Error::Custom("embedded node body too large"));
                }
                Ok(Self::Inline(Box::new(Node::from_rlp(item)?)))
            }
            Some(_) => {
                let mut buf = item;
                let digest = Header::decode_bytes(&mut buf, false)?;
                let digest: [u8; 32] = digest
                    .try_into()
                    .map_err(|_| alloy_rlp::Error::Custom("child reference is not a 32-byte digest"))?;
                Ok(Self::Hash(digest))
            }
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Hash(digest) => write!(f, "Hash({})", hex::encode_prefixed(digest)),
            Self::Inline(node) => f.debug_tuple("Inline").field(node).finish(),
        }
    }
}

impl Encodable for NodeRef {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Inline(node) => node.encode(out),
            _ => out.put_slice(&self.as_rlp_item()),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Empty => 1,
            Self::Hash(_) => 33,
            Self::Inline(node) => node.length(),
        }
    }
}

/// A node of the hexary trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Absence of a node; serializes to the empty string.
    Blank,
    /// Terminates a key, carrying the remaining suffix and the value.
    Leaf(LeafNode),
    /// Compresses a shared path segment in front of a single child.
    Extension(ExtensionNode),
    /// Sixteen child slots plus an optional terminal value.
    Branch(BranchNode),
}

/// Leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    /// Remaining key suffix. Empty only directly under a branch slot, where
    /// the slot itself contributes the last nibble.
    pub path: Nibbles,
    /// The stored value, never empty.
    pub value: Vec<u8>,
}

impl LeafNode {
    pub fn new(path: Nibbles, value: Vec<u8>) -> Self {
        Self { path, value }
    }
}

/// Extension node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionNode {
    /// Shared path segment, never empty.
    pub path: Nibbles,
    /// The single child, never blank and never a leaf in canonical form.
    pub child: NodeRef,
}

impl ExtensionNode {
    pub fn new(path: Nibbles, child: NodeRef) -> Self {
        Self { path, child }
    }
}

/// Branch node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    /// One slot per nibble.
    pub children: [NodeRef; 16],
    /// Terminal value when a key ends at this branch.
    pub value: Option<Vec<u8>>,
}

impl Default for BranchNode {
    fn default() -> Self {
        Self {
            children: std::array::from_fn(|_| NodeRef::Empty),
            value: None,
        }
    }
}

impl BranchNode {
    /// Number of occupied child slots.
    pub fn child_count(&self) -> usize {
        self.children.iter().filter(|child| !child.is_empty()).count()
    }
}

impl Node {
    /// Decodes a stored node body.
    pub fn from_rlp(mut body: &[u8]) -> alloy_rlp::Result<Self> {
        Self::decode(&mut body)
    }

    /// Serializes the node to its RLP body.
    pub fn to_rlp(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }
}

impl Decodable for Node {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let items = match Header::decode_raw(buf)? {
            PayloadView::List(items) => items,
            PayloadView::String(body) => {
                return if body.is_empty() {
                    Ok(Self::Blank)
                } else {
                    Err(alloy_rlp::Error::UnexpectedString)
                }
            }
        };

        match items.len() {
            17 => {
                let mut branch = BranchNode::default();
                for (slot, mut item) in items.into_iter().enumerate() {
                    if slot == 16 {
                        let value = Header::decode_bytes(&mut item, false)?;
                        if !value.is_empty() {
                            branch.value = Some(value.to_vec());
                        }
                    } else {
                        branch.children[slot] = NodeRef::from_raw_rlp(item)?;
                    }
                }
                Ok(Self::Branch(branch))
            }
            2 => {
                let mut path_item = items[0];
                let encoded_path = Header::decode_bytes(&mut path_item, false)?;
                let (is_leaf, path) = compact_decode(encoded_path)?;
                if is_leaf {
                    let mut value_item = items[1];
                    let value = Header::decode_bytes(&mut value_item, false)?;
                    if value.is_empty() {
                        return Err(alloy_rlp::Error::Custom("leaf node with empty value"));
                    }
                    Ok(Self::Leaf(LeafNode::new(path, value.to_vec())))
                } else {
                    if path.is_empty() {
                        return Err(alloy_rlp::Error::Custom("extension node with empty path"));
                    }
                    let child = NodeRef::from_raw_rlp(items[1])?;
                    if child.is_empty() {
                        return Err(alloy_rlp::Error::Custom("extension node without a child"));
                    }
                    Ok(Self::Extension(ExtensionNode::new(path, child)))
                }
            }
            _ => Err(alloy_rlp::Error::Custom("trie node must be a 2-item or 17-item list")),
        }
    }
}

impl Encodable for Node {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Blank => out.put_u8(EMPTY_STRING_CODE),
            Self::Leaf(leaf) => {
                let compact = compact_encode(true, &leaf.path);
                let payload_length = compact.as_slice().length() + leaf.value.as_slice().length();
                Header { list: true, payload_length }.encode(out);
                compact.as_slice().encode(out);
                leaf.value.as_slice().encode(out);
            }
            Self::Extension(ext) => {
                let compact = compact_encode(false, &ext.path);
                let payload_length = compact.as_slice().length() + ext.child.length();
                Header { list: true, payload_length }.encode(out);
                compact.as_slice().encode(out);
                ext.child.encode(out);
            }
            Self::Branch(branch) => {
                let value = branch.value.as_deref().unwrap_or(&[]);
                let payload_length = branch
                    .children
                    .iter()
                    .map(Encodable::length)
                    .sum::<usize>()
                    + value.length();
                Header { list: true, payload_length }.encode(out);
                for child in &branch.children {
                    child.encode(out);
                }
                value.encode(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn nibbles(raw: &[u8]) -> Nibbles {
        Nibbles::from_nibbles(raw)
    }

    #[test]
    fn blank_body_round_trips() {
        assert_eq!(Node::Blank.to_rlp(), vec![EMPTY_STRING_CODE]);
        assert_eq!(Node::from_rlp(&[EMPTY_STRING_CODE]).unwrap(), Node::Blank);
    }

    #[test]
    fn leaf_body_matches_known_encoding() {
        let leaf = Node::Leaf(LeafNode::new(
            nibbles(&[0x6, 0x5, 0x7, 0x9]),
            b"some-value".to_vec(),
        ));
        let body = leaf.to_rlp();
        assert_eq!(body, hex!("cf832065798a736f6d652d76616c7565"));
        assert_eq!(Node::from_rlp(&body).unwrap(), leaf);
    }

    #[test]
    fn extension_round_trips_with_a_hash_child() {
        let ext = Node::Extension(ExtensionNode::new(
            nibbles(&[0x6, 0xd, 0x7]),
            NodeRef::Hash([0xab; 32]),
        ));
        let body = ext.to_rlp();
        assert_eq!(Node::from_rlp(&body).unwrap(), ext);
    }

    #[test]
    fn branch_round_trips_with_mixed_slots() {
        let mut branch = BranchNode::default();
        branch.children[0xb] = NodeRef::Inline(Box::new(Node::Leaf(LeafNode::new(
            nibbles(&[0x6, 0x5]),
            b"v1".to_vec(),
        ))));
        branch.children[0xf] = NodeRef::Hash([0x17; 32]);
        branch.value = Some(b"terminal".to_vec());
        let node = Node::Branch(branch);
        let body = node.to_rlp();
        assert_eq!(Node::from_rlp(&body).unwrap(), node);
    }

    #[test]
    fn small_bodies_inline_and_large_bodies_hash() {
        let small = Node::Leaf(LeafNode::new(nibbles(&[0x1]), b"v".to_vec()));
        let (child, persisted) = NodeRef::from_node(small.clone());
        assert!(matches!(child, NodeRef::Inline(_)));
        assert!(persisted.is_none());
        assert_eq!(child.as_rlp_item().as_slice(), small.to_rlp().as_slice());

        let large = Node::Leaf(LeafNode::new(nibbles(&[0x1]), vec![0xab; 40]));
        let (child, persisted) = NodeRef::from_node(large.clone());
        let (digest, body) = persisted.unwrap();
        assert_eq!(child, NodeRef::Hash(digest));
        assert_eq!(digest, keccak256(&body));
        assert_eq!(body, large.to_rlp());
        assert_eq!(child.as_rlp_item().len(), 33);
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        // a 3-item list is not a trie node
        assert!(Node::from_rlp(&hex!("c3010203")).is_err());
        // non-empty string where a node is expected
        assert!(Node::from_rlp(&hex!("81ff")).is_err());
        // extension whose child slot is the empty string
        assert!(Node::from_rlp(&hex!("c21980")).is_err());
    }
}
