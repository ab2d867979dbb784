//! Longest-prefix matching from text to dictionary name.
//!
//! The on-disk bundle (`dictwords.trie.bin`) is conceptually a
//! hash-array-mapped trie, deflate-compressed then archived. We keep the
//! on-disk *shape* (deflate, then a serialized table) but store our own
//! simple char-keyed prefix tree rather than reimplementing a HAMT — the
//! core only ever needs `longest_prefix`, never insertion after load.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use clause_text::char_segment;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("failed to read trie file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to inflate trie file {path}: {source}")]
    Inflate {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode trie entries: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to encode trie entries: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// One entry of the serialized trie: a dictionary word and the custom
/// dictionary it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrieEntry {
    pub word: String,
    pub dict_name: String,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    /// Set at the node ending an inserted word.
    dict_name: Option<String>,
}

/// In-memory longest-prefix trie over custom-dictionary words.
#[derive(Debug, Default)]
pub struct DictTrie {
    root: TrieNode,
}

impl DictTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, word: &str, dict_name: impl Into<String>) {
        let mut node = &mut self.root;
        for ch in char_segment(word) {
            node = node.children.entry(ch).or_default();
        }
        node.dict_name = Some(dict_name.into());
    }

    pub fn from_entries(entries: impl IntoIterator<Item = TrieEntry>) -> Self {
        let mut trie = Self::new();
        for entry in entries {
            trie.insert(&entry.word, entry.dict_name);
        }
        trie
    }

    /// Load `dictwords.trie.bin`: inflate the deflate/zlib stream, then
    /// decode the resulting bincode-encoded entry list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrieError> {
        let path_ref = path.as_ref();
        let compressed = fs::read(path_ref).map_err(|source| TrieError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|source| TrieError::Inflate {
                path: path_ref.display().to_string(),
                source,
            })?;

        let (entries, _): (Vec<TrieEntry>, _) =
            bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
        debug!(entries = entries.len(), path = %path_ref.display(), "dictionary trie loaded");
        Ok(Self::from_entries(entries))
    }

    /// Longest complete word in the trie that is a prefix of `query`. Returns
    /// `(matched_key, dict_name)`.
    pub fn longest_prefix(&self, query: &str) -> Option<(String, String)> {
        let mut node = &self.root;
        let mut best: Option<(usize, &str)> = None;
        let chars = char_segment(query);

        for (i, ch) in chars.iter().enumerate() {
            match node.children.get(ch) {
                Some(next) => {
                    node = next;
                    if let Some(dict_name) = node.dict_name.as_deref() {
                        best = Some((i + 1, dict_name));
                    }
                }
                None => break,
            }
        }

        best.map(|(len, dict_name)| (chars[..len].concat(), dict_name.to_string()))
    }

    /// Extract a slot value from `query` for `target_dict`.
    ///
    /// Tries `longest_prefix` on the whole query first; on a dictionary-name
    /// mismatch or no match, retries against successive character suffixes
    /// of the query. This approximates whole-utterance scanning without
    /// building a full Aho-Corasick automaton.
    pub fn extract_slotvalue(&self, query: &str, target_dict: &str) -> Option<String> {
        if let Some((word, dict_name)) = self.longest_prefix(query) {
            if dict_name == target_dict {
                return Some(word);
            }
        }

        let chars = char_segment(query);
        for start in 1..chars.len() {
            let suffix = chars[start..].concat();
            if let Some((word, dict_name)) = self.longest_prefix(&suffix) {
                if dict_name == target_dict {
                    return Some(word);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trie() -> DictTrie {
        let mut trie = DictTrie::new();
        trie.insert("上海", "city_cn");
        trie.insert("北京", "city_cn");
        trie.insert("紫外线", "color");
        trie
    }

    #[test]
    fn exact_match_returns_dict_name() {
        let trie = sample_trie();
        let (key, dict) = trie.longest_prefix("上海").unwrap();
        assert_eq!(key, "上海");
        assert_eq!(dict, "city_cn");
    }

    #[test]
    fn longest_prefix_over_a_longer_query() {
        let trie = sample_trie();
        let (key, dict) = trie.longest_prefix("北京天气怎么样").unwrap();
        assert_eq!(key, "北京");
        assert_eq!(dict, "city_cn");
    }

    #[test]
    fn no_match_returns_none() {
        let trie = sample_trie();
        assert!(trie.longest_prefix("东京").is_none());
    }

    #[test]
    fn extract_slotvalue_scans_suffixes_when_prefix_mismatches_dict() {
        let trie = sample_trie();
        // Whole-string longest_prefix doesn't match city_cn directly; must
        // retry at successive suffixes until "上海" is found.
        let value = trie.extract_slotvalue("我从上海出发", "city_cn");
        assert_eq!(value.as_deref(), Some("上海"));
    }

    #[test]
    fn extract_slotvalue_returns_none_for_wrong_dict() {
        let trie = sample_trie();
        assert!(trie.extract_slotvalue("上海天气", "color").is_none());
    }

    #[test]
    fn round_trips_through_deflate_and_bincode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dictwords.trie.bin");

        let entries = vec![
            TrieEntry {
                word: "上海".to_string(),
                dict_name: "city_cn".to_string(),
            },
            TrieEntry {
                word: "北京".to_string(),
                dict_name: "city_cn".to_string(),
            },
        ];
        let raw = bincode::serde::encode_to_vec(&entries, bincode::config::standard()).unwrap();

        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();
        fs::write(&path, compressed).unwrap();

        let trie = DictTrie::load(&path).unwrap();
        let (key, dict) = trie.longest_prefix("上海").unwrap();
        assert_eq!(key, "上海");
        assert_eq!(dict, "city_cn");
    }
}
