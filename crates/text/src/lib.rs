//! External collaborators specified only by the narrow interface the core
//! consumes: the tokenizer bundle and the character segmenter. Neither the
//! dictionary-backed segmenter nor its POS tagger is part of this core —
//! only the shape of the data they hand back.

pub mod charseg;
pub mod token;

pub use charseg::char_segment;
pub use token::{Token, Tokenizer, WhitespaceTokenizer};
