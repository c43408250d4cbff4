//! Nibble-sequence helpers and the compact (hex-prefix) path codec.
//!
//! Leaf and extension paths are stored in compact form: the first nibble of
//! the encoding carries two flag bits (`is_leaf` and odd-length), an odd
//! path contributes its first nibble to the flag byte, and every following
//! byte packs two nibbles. The encoding is bijective on
//! `(is_leaf, nibble-sequence)`.

use alloy_rlp::Error as RlpError;
use nybbles::Nibbles;

use crate::constants::{FLAG_LEAF, FLAG_ODD};

/// Packs an even-length nibble sequence back into bytes, high nibble first.
///
/// Returns `None` for odd-length input, which cannot come from a byte key.
pub fn pack_nibbles(path: &Nibbles) -> Option<Vec<u8>> {
    if path.len() % 2 != 0 {
        return None;
    }
    Some(path.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

/// Encodes a path segment into its compact on-disk form.
pub fn compact_encode(is_leaf: bool, path: &Nibbles) -> Vec<u8> {
    let flag = if is_leaf { FLAG_LEAF } else { 0 };
    let mut out = Vec::with_capacity(path.len() / 2 + 1);
    if path.len() % 2 == 0 {
        out.push(flag);
        for pair in path.chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    } else {
        out.push(flag | FLAG_ODD | path[0]);
        for pair in path[1..].chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
    }
    out
}

/// Decodes a compact path segment into its flag and nibble sequence.
pub fn compact_decode(encoded: &[u8]) -> Result<(bool, Nibbles), RlpError> {
    let first = *encoded.first().ok_or(RlpError::Custom("compact path is empty"))?;
    if first & 0xc0 != 0 {
        return Err(RlpError::Custom("unknown compact path flag"));
    }
    let is_leaf = first & FLAG_LEAF != 0;
    let mut path = Nibbles::with_capacity(encoded.len() * 2);
    if first & FLAG_ODD != 0 {
        path.push(first & 0x0f);
    } else if first & 0x0f != 0 {
        return Err(RlpError::Custom("nonzero padding in compact path"));
    }
    for byte in &encoded[1..] {
        path.push(byte >> 4);
        path.push(byte & 0x0f);
    }
    Ok((is_leaf, path))
}

/// `head` followed by `tail`.
pub(crate) fn concat(head: &Nibbles, tail: &Nibbles) -> Nibbles {
    let mut out = head.clone();
    out.extend_from_slice(tail);
    out
}

/// `nibble` followed by `tail`.
pub(crate) fn prepend(nibble: u8, tail: &Nibbles) -> Nibbles {
    let mut out = Nibbles::with_capacity(tail.len() + 1);
    out.push(nibble);
    out.extend_from_slice(tail);
    out
}
