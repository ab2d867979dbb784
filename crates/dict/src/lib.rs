//! Custom-dictionary lookups: the trie (longest-prefix match from text to
//! dictionary name) and the KV store (exact membership test).

pub mod kv;
pub mod trie;

pub use kv::{DictKv, DictKvError};
pub use trie::{DictTrie, TrieError};
