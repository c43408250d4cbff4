//! Errors surfaced by the key-value operations of the trie.

use core::fmt;

use nybbles::Nibbles;

/// Failure of a `get`/`set`/`delete`/`contains_key` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// A referenced node body could not be found in the backing store.
    MissingTrieNode {
        /// Storage key that failed to resolve.
        missing: [u8; 32],
        /// Root hash of the trie at the time of the fault.
        root: [u8; 32],
        /// The key the operation was working on.
        key: Vec<u8>,
        /// Nibbles walked from the root before the fault. Lookups track
        /// this; mutations rebuild the spine bottom-up and report `None`.
        prefix: Option<Nibbles>,
    },
    /// A stored node body failed to decode.
    Rlp(alloy_rlp::Error),
    /// The caller passed an empty key. Keys are non-empty byte strings.
    EmptyKey,
    /// An internal structural invariant was violated. This indicates a bug
    /// or a corrupted store, never a consequence of well-formed input.
    BadTrieInvariant(&'static str),
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTrieNode { missing, root, key, prefix } => write!(
                f,
                "missing trie node {} (key {}, root {}, prefix {:?})",
                hex::encode_prefixed(missing),
                hex::encode_prefixed(key),
                hex::encode_prefixed(root),
                prefix,
            ),
            Self::Rlp(err) => write!(f, "undecodable node body: {err}"),
            Self::EmptyKey => f.write_str("trie keys must be non-empty"),
            Self::BadTrieInvariant(what) => write!(f, "trie invariant violated: {what}"),
        }
    }
}

impl std::error::Error for TrieError {}

impl From<alloy_rlp::Error> for TrieError {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Rlp(err)
    }
}
