//! Merkle proof construction and verification.

use core::fmt;

use nybbles::Nibbles;

use crate::constants::EMPTY_ROOT_HASH;
use crate::error::TrieError;
use crate::keccak::keccak256;
use crate::node::{Node, NodeRef};
use crate::store::{MemoryDb, TrieDb};
use crate::trie::HexaryTrie;

/// Proof rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidProof {
    /// A referenced digest has no matching body in the proof.
    MissingNode {
        /// The digest that could not be resolved.
        missing: [u8; 32],
    },
    /// A proof body failed to decode.
    Rlp(alloy_rlp::Error),
    /// A non-empty proof was presented for the empty root.
    UnexpectedProofNodes,
}

impl fmt::Display for InvalidProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode { missing } => write!(
                f,
                "proof does not contain a body for {}",
                hex::encode_prefixed(missing),
            ),
            Self::Rlp(err) => write!(f, "undecodable proof node: {err}"),
            Self::UnexpectedProofNodes => f.write_str("non-empty proof for the empty root"),
        }
    }
}

impl std::error::Error for InvalidProof {}

impl From<alloy_rlp::Error> for InvalidProof {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Rlp(err)
    }
}

impl<D: TrieDb> HexaryTrie<D> {
    /// Collects the node bodies on the path from the root towards `key`:
    /// down to its value, or to the divergence point that shows the key
    /// absent. Inlined children travel expanded inside their parent's body
    /// rather than as separate entries. The empty trie proves every
    /// exclusion with an empty sequence.
    pub fn get_proof(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
        if key.is_empty() {
            return Err(TrieError::EmptyKey);
        }
        let path = Nibbles::unpack(key);
        let mut proof = Vec::new();
        if self.root_hash() == EMPTY_ROOT_HASH {
            return Ok(proof);
        }
        let mut digest = self.root_hash();
        let mut at = 0;
        'resolve: loop {
            let body = self.db().get(&digest).ok_or_else(|| TrieError::MissingTrieNode {
                missing: digest,
                root: self.root_hash(),
                key: key.to_vec(),
                prefix: Some(path.slice(..at)),
            })?;
            proof.push(body.clone());
            let mut node = Node::from_rlp(&body)?;
            // Walk within this body and any inlined descendants until the
            // next out-of-line reference or a terminal.
            loop {
                match node {
                    Node::Blank | Node::Leaf(_) => break 'resolve,
                    Node::Extension(ext) => {
                        if !path[at..].starts_with(&ext.path) {
                            break 'resolve;
                        }
                        at += ext.path.len();
                        match ext.child {
                            NodeRef::Empty => break 'resolve,
                            NodeRef::Inline(sub) => node = *sub,
                            NodeRef::Hash(next) => {
                                digest = next;
                                continue 'resolve;
                            }
                        }
                    }
                    Node::Branch(mut branch) => {
                        if at == path.len() {
                            break 'resolve;
                        }
                        let slot = path[at] as usize;
                        at += 1;
                        match std::mem::take(&mut branch.children[slot]) {
                            NodeRef::Empty => break 'resolve,
                            NodeRef::Inline(sub) => node = *sub,
                            NodeRef::Hash(next) => {
                                digest = next;
                                continue 'resolve;
                            }
                        }
                    }
                }
            }
        }
        Ok(proof)
    }
}

/// Checks `proof` against `root`, walking `key` exactly as a lookup would.
///
/// Returns the proven value, `None` for a valid exclusion proof, or an
/// [`InvalidProof`] when a referenced body is missing or malformed. A
/// tampered body counts as missing, since its digest no longer matches
/// anything on the path.
pub fn verify_proof(
    root: &[u8; 32],
    key: &[u8],
    proof: &[Vec<u8>],
) -> Result<Option<Vec<u8>>, InvalidProof> {
    if *root == EMPTY_ROOT_HASH {
        return if proof.is_empty() {
            Ok(None)
        } else {
            Err(InvalidProof::UnexpectedProofNodes)
        };
    }
    let mut bodies = MemoryDb::new();
    for body in proof {
        bodies.insert(keccak256(body), body.clone());
    }
    let path = Nibbles::unpack(key);
    let mut at = 0;
    let mut node = read_proof_node(&bodies, root)?;
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
                node = follow(&bodies, ext.child)?;
            }
            Node::Branch(mut branch) => {
                if at == path.len() {
                    return Ok(branch.value.take());
                }
                let slot = path[at] as usize;
                at += 1;
                node = follow(&bodies, std::mem::take(&mut branch.children[slot]))?;
            }
        }
    }
}

fn follow(bodies: &MemoryDb, child: NodeRef) -> Result<Node, InvalidProof> {
    match child {
        NodeRef::Empty => Ok(Node::Blank),
        NodeRef::Inline(node) => Ok(*node),
        NodeRef::Hash(digest) => read_proof_node(bodies, &digest),
    }
}

fn read_proof_node(bodies: &MemoryDb, digest: &[u8; 32]) -> Result<Node, InvalidProof> {
    let body = bodies
        .get(digest)
        .ok_or(InvalidProof::MissingNode { missing: *digest })?;
    Ok(Node::from_rlp(&body)?)
}
