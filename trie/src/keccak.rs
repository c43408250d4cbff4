use tiny_keccak::{Hasher, Keccak};

/// Computes the keccak-256 digest of `bytes`.
///
/// Node bodies are addressed in the store by the digest of their RLP
/// serialization; the same function authenticates the root.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}
