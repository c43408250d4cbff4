use crate::node::Node;
use crate::store::TrieDb;
use crate::tests::defaults::{empty_trie, interior_digest, word_pairs, word_trie};
use crate::traverse::TraversalError;

#[test]
fn items_come_out_in_key_order() -> anyhow::Result<()> {
    let trie = word_trie()?;
    let mut expected: Vec<(Vec<u8>, Vec<u8>)> = word_pairs()
        .into_iter()
        .map(|(key, value)| (key.to_vec(), value.to_vec()))
        .collect();
    expected.sort();

    let items: Vec<(Vec<u8>, Vec<u8>)> = trie.items().collect::<Result<_, _>>()?;
    assert_eq!(items, expected);

    let keys: Vec<Vec<u8>> = trie.keys().collect::<Result<_, _>>()?;
    assert_eq!(keys, expected.iter().map(|(key, _)| key.clone()).collect::<Vec<_>>());

    let values: Vec<Vec<u8>> = trie.values().collect::<Result<_, _>>()?;
    assert_eq!(values, expected.iter().map(|(_, value)| value.clone()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn branch_terminals_precede_their_subtrees() -> anyhow::Result<()> {
    // "do" terminates at a branch that also fans out to "dog"/"doge".
    let trie = word_trie()?;
    let keys: Vec<Vec<u8>> = trie.keys().collect::<Result<_, _>>()?;
    let do_position = keys.iter().position(|key| key == b"do").unwrap();
    let dog_position = keys.iter().position(|key| key == b"dog").unwrap();
    assert!(do_position < dog_position);
    Ok(())
}

#[test]
fn nodes_walk_is_lazy_and_restartable() -> anyhow::Result<()> {
    let trie = word_trie()?;
    let mut first = trie.nodes();
    let (root_prefix, root_node) = first.next().unwrap()?;
    assert!(root_prefix.is_empty());
    assert!(matches!(root_node, Node::Branch(_)));

    // a second walker starts from the top again
    let total = trie.nodes().count();
    let rest = first.count();
    assert_eq!(rest, total - 1);
    Ok(())
}

#[test]
fn iterating_an_empty_trie_yields_nothing() {
    let trie = empty_trie();
    assert_eq!(trie.nodes().count(), 0);
    assert_eq!(trie.items().count(), 0);
}

#[test]
fn a_missing_body_surfaces_once_then_fuses() -> anyhow::Result<()> {
    let mut trie = word_trie()?;
    let victim = interior_digest(&trie)?;
    trie.db_mut().remove(&victim);

    let mut faults = 0;
    for entry in trie.nodes() {
        if let Err(TraversalError::MissingNode { missing, .. }) = entry {
            assert_eq!(missing, victim);
            faults += 1;
        }
    }
    assert_eq!(faults, 1);
    Ok(())
}
