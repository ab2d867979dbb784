//! Elite-set recall: per-token OR retrieval over an in-memory inverted
//! index, approximating an elite-set query by deduplicating and capping the
//! query terms rather than running a true elite-set collector.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, STORED, STRING};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum RecallError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("failed to read recall corpus file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode recall corpus: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to encode recall corpus: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// A single retrieval candidate, paired with its Tantivy relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallMatch {
    pub intent_name: String,
    pub utterance: String,
    pub score: f32,
}

/// One labeled training utterance, as stored by the recall index build step.
///
/// The on-disk bundle's `xapian/` inverted-index directory is an external
/// build artifact this core only reads — building the corpus index is out
/// of scope here; we substitute our own bincode-encoded sample list for the
/// same role, the same way `clause-dict` substitutes a prefix tree for a
/// hash-array-mapped trie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallSample {
    pub intent_name: String,
    pub utterance: String,
    pub terms: Vec<String>,
}

/// In-memory recall index over intent training utterances.
///
/// Holds an `IndexReader` with `ReloadPolicy::Manual`: callers must reopen it
/// on every search rather than relying on a background refresh, matching the
/// per-call `reopen()` discipline the index is expected to follow.
pub struct RecallIndex {
    reader: IndexReader,
    intent_field: Field,
    utterance_field: Field,
    term_field: Field,
    elite_set_size: usize,
    top_n: usize,
}

impl RecallIndex {
    /// Build a fresh index from labeled training samples.
    pub fn build(
        samples: &[RecallSample],
        elite_set_size: usize,
        top_n: usize,
    ) -> Result<Self, RecallError> {
        let mut schema_builder = Schema::builder();
        let intent_field = schema_builder.add_text_field("intent_name", STRING | STORED);
        let utterance_field = schema_builder.add_text_field("utterance", STORED);
        let term_field = schema_builder.add_text_field("term", STRING);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer = index.writer(15_000_000)?;

        for sample in samples {
            let mut document = TantivyDocument::new();
            document.add_text(intent_field, &sample.intent_name);
            document.add_text(utterance_field, &sample.utterance);
            for term in dedupe_preserve_order(&sample.terms) {
                document.add_text(term_field, &term);
            }
            writer.add_document(document)?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            reader,
            intent_field,
            utterance_field,
            term_field,
            elite_set_size,
            top_n,
        })
    }

    /// Load a bincode-encoded `Vec<RecallSample>` corpus file and build an
    /// index from it in one step — the bundle-loading counterpart to
    /// `build`, used by `clause-bot` at init.
    pub fn load(
        path: impl AsRef<Path>,
        elite_set_size: usize,
        top_n: usize,
    ) -> Result<Self, RecallError> {
        let path_ref = path.as_ref();
        let bytes = fs::read(path_ref).map_err(|source| RecallError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        let (samples, _): (Vec<RecallSample>, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        Self::build(&samples, elite_set_size, top_n)
    }

    /// Persist `samples` as the bincode-encoded corpus file `load` expects.
    pub fn save_corpus(path: impl AsRef<Path>, samples: &[RecallSample]) -> Result<(), RecallError> {
        let bytes = bincode::serde::encode_to_vec(samples, bincode::config::standard())?;
        fs::write(path, bytes).map_err(|source| RecallError::Read {
            path: "<write>".to_string(),
            source,
        })?;
        Ok(())
    }

    /// Retrieve the top candidates for `query_terms`, reopening the reader
    /// first so the search always sees the latest committed segments.
    pub fn search(&self, query_terms: &[String]) -> Result<Vec<RecallMatch>, RecallError> {
        self.reader.reload()?;
        trace!(terms = query_terms.len(), "recall reader reopened before search");

        let elite_terms: Vec<String> = dedupe_preserve_order(query_terms)
            .into_iter()
            .take(self.elite_set_size)
            .collect();

        if elite_terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = elite_terms
            .iter()
            .map(|term| {
                let term_query = TermQuery::new(
                    Term::from_field_text(self.term_field, term),
                    IndexRecordOption::Basic,
                );
                (Occur::Should, Box::new(term_query) as Box<dyn Query>)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.top_n))?;

        let mut matches = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let document: TantivyDocument = searcher.doc(doc_address)?;
            let intent_name = document
                .get_first(self.intent_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let utterance = document
                .get_first(self.utterance_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            matches.push(RecallMatch {
                intent_name,
                utterance,
                score,
            });
        }
        Ok(matches)
    }
}

fn dedupe_preserve_order(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for term in terms {
        if seen.insert(term.clone()) {
            out.push(term.clone());
        }
    }
    out
}
