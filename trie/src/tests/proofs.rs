use crate::constants::EMPTY_ROOT_HASH;
use crate::proof::{verify_proof, InvalidProof};
use crate::tests::defaults::{empty_trie, two_key_trie, word_pairs, word_trie};

#[test]
fn sibling_keys_prove_with_two_shared_nodes() -> anyhow::Result<()> {
    let trie = two_key_trie()?;

    let proof = trie.get_proof(b"my-key")?;
    assert_eq!(proof.len(), 2, "root extension plus branch with inlined leaves");
    assert_eq!(
        verify_proof(&trie.root_hash(), b"my-key", &proof)?.as_deref(),
        Some(&b"some-value"[..])
    );

    let proof = trie.get_proof(b"my-other-key")?;
    assert_eq!(proof.len(), 2);
    assert_eq!(
        verify_proof(&trie.root_hash(), b"my-other-key", &proof)?.as_deref(),
        Some(&b"another-value"[..])
    );
    Ok(())
}

#[test]
fn exclusion_proofs_verify_to_none() -> anyhow::Result<()> {
    let trie = two_key_trie()?;

    // diverges inside the root extension's segment
    let proof = trie.get_proof(b"my-third-key")?;
    assert_eq!(proof.len(), 1);
    assert_eq!(verify_proof(&trie.root_hash(), b"my-third-key", &proof)?, None);

    // reaches the branch, then misses inside an inlined leaf
    let proof = trie.get_proof(b"my-kez")?;
    assert_eq!(proof.len(), 2);
    assert_eq!(verify_proof(&trie.root_hash(), b"my-kez", &proof)?, None);
    Ok(())
}

#[test]
fn the_empty_trie_proves_every_exclusion_with_no_nodes() -> anyhow::Result<()> {
    let trie = empty_trie();
    let proof = trie.get_proof(b"my-key")?;
    assert!(proof.is_empty());
    assert_eq!(verify_proof(&EMPTY_ROOT_HASH, b"my-key", &proof)?, None);

    let err = verify_proof(&EMPTY_ROOT_HASH, b"my-key", &[vec![0x80]]).unwrap_err();
    assert_eq!(err, InvalidProof::UnexpectedProofNodes);
    Ok(())
}

#[test]
fn verification_matches_lookup_for_every_key() -> anyhow::Result<()> {
    let trie = word_trie()?;
    let mut keys: Vec<&[u8]> = word_pairs().into_iter().map(|(key, _)| key).collect();
    keys.extend([&b"d"[..], &b"dot"[..], &b"horses"[..], &b"zebra"[..]]);
    for key in keys {
        let proof = trie.get_proof(key)?;
        assert_eq!(
            verify_proof(&trie.root_hash(), key, &proof)?,
            trie.get(key)?,
            "key {:?}",
            String::from_utf8_lossy(key)
        );
    }
    Ok(())
}

#[test]
fn tampered_proofs_are_rejected() -> anyhow::Result<()> {
    let trie = two_key_trie()?;
    let proof = trie.get_proof(b"my-key")?;

    let mut tampered = proof.clone();
    tampered[1][5] ^= 0x01;
    let err = verify_proof(&trie.root_hash(), b"my-key", &tampered).unwrap_err();
    assert!(matches!(err, InvalidProof::MissingNode { .. }));

    let truncated = &proof[..1];
    let err = verify_proof(&trie.root_hash(), b"my-key", truncated).unwrap_err();
    assert!(matches!(err, InvalidProof::MissingNode { .. }));

    let err = verify_proof(&[0x42; 32], b"my-key", &proof).unwrap_err();
    assert_eq!(err, InvalidProof::MissingNode { missing: [0x42; 32] });
    Ok(())
}
