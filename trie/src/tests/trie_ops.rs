use hex_literal::hex;
use nybbles::Nibbles;

use crate::constants::EMPTY_ROOT_HASH;
use crate::error::TrieError;
use crate::store::TrieDb;
use crate::tests::defaults::{empty_trie, two_key_branch_digest, two_key_trie, word_pairs};

#[test]
fn empty_trie_root_is_the_well_known_hash() {
    let trie = empty_trie();
    assert_eq!(trie.root_hash(), EMPTY_ROOT_HASH);
    assert_eq!(
        trie.root_hash(),
        hex!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
    );
    assert!(trie.db().is_empty());
}

#[test]
fn set_then_get() -> anyhow::Result<()> {
    let mut trie = empty_trie();
    trie.set(b"my-key", b"some-value")?;
    assert_eq!(trie.get(b"my-key")?.as_deref(), Some(&b"some-value"[..]));
    assert!(trie.contains_key(b"my-key")?);
    assert_eq!(trie.get(b"missing")?, None);
    assert!(!trie.contains_key(b"missing")?);
    Ok(())
}

#[test]
fn overwriting_changes_the_value_and_the_root() -> anyhow::Result<()> {
    let mut trie = empty_trie();
    trie.set(b"my-key", b"some-value")?;
    let before = trie.root_hash();
    trie.set(b"my-key", b"replacement")?;
    assert_eq!(trie.get(b"my-key")?.as_deref(), Some(&b"replacement"[..]));
    assert_ne!(trie.root_hash(), before);

    let mut direct = empty_trie();
    direct.set(b"my-key", b"replacement")?;
    assert_eq!(trie.root_hash(), direct.root_hash());
    Ok(())
}

#[test]
fn setting_the_empty_value_on_an_empty_trie_writes_nothing() -> anyhow::Result<()> {
    let mut trie = empty_trie();
    trie.set(b"my-key", b"")?;
    assert_eq!(trie.root_hash(), EMPTY_ROOT_HASH);
    assert!(trie.db().is_empty());
    Ok(())
}

#[test]
fn setting_the_empty_value_equals_deleting() -> anyhow::Result<()> {
    let mut via_empty_set = empty_trie();
    via_empty_set.set(b"my-key", b"some-value")?;
    via_empty_set.set(b"other", b"x")?;
    via_empty_set.set(b"other", b"")?;

    let mut via_delete = empty_trie();
    via_delete.set(b"my-key", b"some-value")?;
    via_delete.set(b"other", b"x")?;
    via_delete.delete(b"other")?;

    assert_eq!(via_empty_set.root_hash(), via_delete.root_hash());
    assert_eq!(via_empty_set.db(), via_delete.db());
    Ok(())
}

#[test]
fn deleting_restores_the_prior_root() -> anyhow::Result<()> {
    let mut reference = empty_trie();
    reference.set(b"my-key", b"some-value")?;

    let mut trie = two_key_trie()?;
    trie.delete(b"my-other-key")?;
    assert_eq!(trie.root_hash(), reference.root_hash());
    assert_eq!(trie.get(b"my-other-key")?, None);
    Ok(())
}

#[test]
fn deleting_every_key_empties_the_root() -> anyhow::Result<()> {
    let mut trie = two_key_trie()?;
    trie.delete(b"my-key")?;
    trie.delete(b"my-other-key")?;
    assert_eq!(trie.root_hash(), EMPTY_ROOT_HASH);
    Ok(())
}

#[test]
fn deleting_an_absent_key_is_a_no_op() -> anyhow::Result<()> {
    let mut trie = two_key_trie()?;
    let root = trie.root_hash();
    let store = trie.db().clone();
    trie.delete(b"not-there")?;
    trie.delete(b"my-key-but-longer")?;
    trie.delete(b"my-k")?;
    assert_eq!(trie.root_hash(), root);
    assert_eq!(trie.db(), &store);
    Ok(())
}

#[test]
fn deleting_a_key_prefix_keeps_the_longer_key() -> anyhow::Result<()> {
    let mut trie = empty_trie();
    trie.set(b"short", b"one")?;
    trie.set(b"short-nope-long", b"two")?;
    trie.delete(b"short")?;
    assert_eq!(trie.get(b"short")?, None);
    assert_eq!(trie.get(b"short-nope-long")?.as_deref(), Some(&b"two"[..]));

    let mut reference = empty_trie();
    reference.set(b"short-nope-long", b"two")?;
    assert_eq!(trie.root_hash(), reference.root_hash());
    Ok(())
}

#[test]
fn root_is_insertion_order_independent() -> anyhow::Result<()> {
    let pairs = word_pairs();
    let mut roots = Vec::new();
    for rotation in 0..pairs.len() {
        let mut trie = empty_trie();
        for (key, value) in pairs.iter().cycle().skip(rotation).take(pairs.len()) {
            trie.set(key, value)?;
        }
        roots.push(trie.root_hash());
    }
    roots.dedup();
    assert_eq!(roots.len(), 1);
    Ok(())
}

#[test]
fn a_detour_through_extra_keys_converges_to_the_same_root() -> anyhow::Result<()> {
    let mut direct = empty_trie();
    for (key, value) in word_pairs() {
        direct.set(key, value)?;
    }

    let mut detour = empty_trie();
    detour.set(b"transient", b"gone-soon")?;
    for (key, value) in word_pairs() {
        detour.set(key, b"placeholder")?;
        detour.set(key, value)?;
    }
    detour.delete(b"transient")?;

    assert_eq!(direct.root_hash(), detour.root_hash());
    Ok(())
}

#[test]
fn lookup_reports_the_missing_node_with_context() -> anyhow::Result<()> {
    let mut trie = two_key_trie()?;
    let root = trie.root_hash();
    let victim = two_key_branch_digest(&trie)?;
    trie.db_mut().remove(&victim);

    match trie.get(b"my-key") {
        Err(TrieError::MissingTrieNode { missing, root: at_root, key, prefix }) => {
            assert_eq!(missing, victim);
            assert_eq!(at_root, root);
            assert_eq!(key, b"my-key".to_vec());
            assert_eq!(
                prefix,
                Some(Nibbles::from_nibbles([0x6, 0xd, 0x7, 0x9, 0x2, 0xd, 0x6]))
            );
        }
        other => panic!("expected a missing-node fault, got {other:?}"),
    }

    // Mutations rebuild bottom-up and report the prefix as unknown.
    match trie.set(b"my-key", b"new-value") {
        Err(TrieError::MissingTrieNode { missing, prefix, .. }) => {
            assert_eq!(missing, victim);
            assert_eq!(prefix, None);
        }
        other => panic!("expected a missing-node fault, got {other:?}"),
    }
    match trie.delete(b"my-key") {
        Err(TrieError::MissingTrieNode { prefix, .. }) => assert_eq!(prefix, None),
        other => panic!("expected a missing-node fault, got {other:?}"),
    }
    Ok(())
}

#[test]
fn empty_keys_are_rejected() {
    let mut trie = empty_trie();
    assert_eq!(trie.get(b"").unwrap_err(), TrieError::EmptyKey);
    assert_eq!(trie.set(b"", b"x").unwrap_err(), TrieError::EmptyKey);
    assert_eq!(trie.delete(b"").unwrap_err(), TrieError::EmptyKey);
    assert_eq!(trie.contains_key(b"").unwrap_err(), TrieError::EmptyKey);
}

#[test]
fn values_survive_a_reopen_at_the_same_root() -> anyhow::Result<()> {
    let mut trie = two_key_trie()?;
    trie.set(b"third", b"entry")?;
    let root = trie.root_hash();
    let db = trie.into_db();

    let reopened = crate::trie::HexaryTrie::at_root(db, root);
    assert_eq!(reopened.get(b"my-key")?.as_deref(), Some(&b"some-value"[..]));
    assert_eq!(reopened.get(b"third")?.as_deref(), Some(&b"entry"[..]));
    Ok(())
}
