/// One segmented term and its part-of-speech tag, as produced by the
/// external tokenizer bundle. The POS tag carries no `@` prefix here —
/// that namespacing is applied later, at CRF feature-construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub pos: String,
}

impl Token {
    pub fn new(term: impl Into<String>, pos: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            pos: pos.into(),
        }
    }
}

/// Narrow interface onto the tokenizer dictionary bundle:
/// `tokenize(query) -> [(term, pos)]`. The bundle itself (jieba-style
/// dictionaries, HMM model, user dictionary, IDF table, stop words) lives
/// entirely outside this crate; only this trait boundary is ours.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, query: &str) -> Vec<Token>;
}

/// Reference adapter used by tests and by callers that have not wired a real
/// dictionary-backed segmenter: splits on Unicode whitespace and reports
/// every term with the same placeholder POS tag.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, query: &str) -> Vec<Token> {
        query
            .split_whitespace()
            .map(|term| Token::new(term, "x"))
            .collect()
    }
}
