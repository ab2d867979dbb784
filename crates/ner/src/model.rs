//! Sequence-labeling decode: a `Tagger` capability trait plus a bundled
//! linear-chain CRF Viterbi decoder.
//!
//! The real `crfsuite.ner.model` format is an external artifact this core
//! never writes, only reads — training a CRF is out of scope here. We
//! substitute our own bincode-encoded weight table for the same role, the
//! same way `clause-dict::trie` substitutes a char-keyed prefix tree for a
//! hash-array-mapped trie: the on-disk *contract* (a path, optionally
//! absent) is preserved; the serialization underneath is ours.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::features::FeatureItem;

#[derive(Debug, Error)]
pub enum CrfError {
    #[error("failed to read CRF model file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode CRF model: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to encode CRF model: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// Narrow interface onto the sequence-labeling decoder:
/// `tag(item_sequence) -> [label]`. Tag a position sequence into BIO labels.
pub trait Tagger: Send + Sync {
    fn tag(&self, items: &[FeatureItem]) -> Vec<String>;
}

/// Degenerate tagger used when the CRF model failed to load: every position
/// is tagged `O`, so downstream slot extraction degrades to an empty
/// candidate list instead of panicking.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTagger;

impl Tagger for NullTagger {
    fn tag(&self, items: &[FeatureItem]) -> Vec<String> {
        vec!["O".to_string(); items.len()]
    }
}

/// On-disk weight table: per-feature emission weights and label-bigram
/// transition weights.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrfModelData {
    pub labels: Vec<String>,
    /// feature -> (label -> weight)
    pub emission: Vec<(String, Vec<(String, f32)>)>,
    /// (prev_label, label) -> weight
    pub transition: Vec<((String, String), f32)>,
}

/// A trained linear-chain CRF, decoded by Viterbi.
pub struct CrfTagger {
    labels: Vec<String>,
    emission: HashMap<String, HashMap<String, f32>>,
    transition: HashMap<(String, String), f32>,
}

impl CrfTagger {
    pub fn from_data(data: CrfModelData) -> Self {
        let emission = data
            .emission
            .into_iter()
            .map(|(feature, weights)| (feature, weights.into_iter().collect()))
            .collect();
        let transition = data.transition.into_iter().collect();
        Self {
            labels: data.labels,
            emission,
            transition,
        }
    }

    /// Load `crfsuite.ner.model`. A missing or corrupt file is a *soft*
    /// failure at the bot level: callers map `Err` here to a degraded
    /// `NullTagger` rather than aborting bot init.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CrfError> {
        let path_ref = path.as_ref();
        let bytes = fs::read(path_ref).map_err(|source| CrfError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        let (data, _): (CrfModelData, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        debug!(labels = data.labels.len(), path = %path_ref.display(), "CRF model loaded");
        Ok(Self::from_data(data))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CrfError> {
        let data = CrfModelData {
            labels: self.labels.clone(),
            emission: self
                .emission
                .iter()
                .map(|(f, w)| (f.clone(), w.iter().map(|(l, v)| (l.clone(), *v)).collect()))
                .collect(),
            transition: self
                .transition
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        };
        let bytes = bincode::serde::encode_to_vec(&data, bincode::config::standard())?;
        fs::write(path, bytes).map_err(|source| CrfError::Read {
            path: "<write>".to_string(),
            source,
        })?;
        Ok(())
    }

    fn emission_score(&self, item: &FeatureItem, label: &str) -> f32 {
        item.iter()
            .filter_map(|feature| self.emission.get(feature))
            .filter_map(|weights| weights.get(label))
            .sum()
    }

    fn transition_score(&self, prev: &str, label: &str) -> f32 {
        self.transition
            .get(&(prev.to_string(), label.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}

impl Tagger for CrfTagger {
    /// Viterbi decode over the label alphabet: `score(y) = sum_t
    /// emission(x_t, y_t) + transition(y_{t-1}, y_t)`, maximized by dynamic
    /// programming with backpointers.
    fn tag(&self, items: &[FeatureItem]) -> Vec<String> {
        if items.is_empty() {
            return Vec::new();
        }
        if self.labels.is_empty() {
            return vec!["O".to_string(); items.len()];
        }

        let n = items.len();
        let k = self.labels.len();
        // dp[t][l] = best score of any path ending in label l at position t.
        let mut dp = vec![vec![f32::NEG_INFINITY; k]; n];
        let mut back = vec![vec![0usize; k]; n];

        for (l, label) in self.labels.iter().enumerate() {
            dp[0][l] = self.emission_score(&items[0], label);
        }

        for t in 1..n {
            for (l, label) in self.labels.iter().enumerate() {
                let emission = self.emission_score(&items[t], label);
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0usize;
                for (pl, prev_label) in self.labels.iter().enumerate() {
                    let score =
                        dp[t - 1][pl] + self.transition_score(prev_label, label) + emission;
                    if score > best_score {
                        best_score = score;
                        best_prev = pl;
                    }
                }
                dp[t][l] = best_score;
                back[t][l] = best_prev;
            }
        }

        let mut best_last = 0usize;
        for l in 1..k {
            if dp[n - 1][l] > dp[n - 1][best_last] {
                best_last = l;
            }
        }

        let mut path = vec![0usize; n];
        path[n - 1] = best_last;
        for t in (1..n).rev() {
            path[t - 1] = back[t][path[t]];
        }

        path.into_iter().map(|l| self.labels[l].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> CrfTagger {
        // Two labels, "B-city" strongly favored when the feature "w[t]=上海"
        // fires, "O" favored otherwise; a transition bias keeps "O" after "O".
        let data = CrfModelData {
            labels: vec!["O".to_string(), "B-city".to_string()],
            emission: vec![
                (
                    "w[t]=上海".to_string(),
                    vec![("B-city".to_string(), 5.0), ("O".to_string(), -5.0)],
                ),
                (
                    "w[t]=去".to_string(),
                    vec![("O".to_string(), 1.0)],
                ),
            ],
            transition: vec![(("O".to_string(), "O".to_string()), 1.0)],
        };
        CrfTagger::from_data(data)
    }

    #[test]
    fn decodes_strongly_weighted_feature_to_its_label() {
        let tagger = toy_model();
        let items = vec![
            vec!["w[t]=去".to_string()],
            vec!["w[t]=上海".to_string()],
        ];
        let tags = tagger.tag(&items);
        assert_eq!(tags, vec!["O".to_string(), "B-city".to_string()]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let tagger = toy_model();
        assert!(tagger.tag(&[]).is_empty());
    }

    #[test]
    fn null_tagger_always_emits_outside() {
        let tagger = NullTagger;
        let items = vec![vec!["w[t]=上海".to_string()], Vec::new()];
        assert_eq!(tagger.tag(&items), vec!["O".to_string(), "O".to_string()]);
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crfsuite.ner.model");

        let tagger = toy_model();
        tagger.save(&path).unwrap();

        let loaded = CrfTagger::open(&path).unwrap();
        let items = vec![vec!["w[t]=上海".to_string()]];
        assert_eq!(loaded.tag(&items), vec!["B-city".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error_callers_can_degrade_from() {
        let err = CrfTagger::open("/nonexistent/crfsuite.ner.model");
        assert!(err.is_err());
    }
}
