use std::ops::Range;

use hex_literal::hex;

/// Root hash of the empty trie: `keccak256(rlp(b""))`.
///
/// The empty root is a well-known constant and its body is never persisted.
pub const EMPTY_ROOT_HASH: [u8; 32] =
    hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Branch nodes address their children by a single nibble.
pub const CHILD_INDEX_RANGE: Range<u8> = 0..16;

/// Hex-prefix flag bit set on leaf paths.
pub(crate) const FLAG_LEAF: u8 = 0x20;

/// Hex-prefix flag bit set on odd-length paths.
pub(crate) const FLAG_ODD: u8 = 0x10;
