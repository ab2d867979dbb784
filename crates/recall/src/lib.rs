//! Intent recall: the elite-set inverted-index retrieval stage and the
//! character-bag similarity reranker that turns its candidates into a
//! classification decision.

pub mod index;
pub mod similarity;

pub use index::{RecallError, RecallIndex, RecallMatch, RecallSample};
pub use similarity::char_bag_similarity;
