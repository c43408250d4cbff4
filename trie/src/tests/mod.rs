mod iterators;
mod proofs;
mod trie_ops;
