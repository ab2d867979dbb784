//! Sequence labeling: CRF feature construction, the tagger adapter, and
//! BIO-to-slot-candidate extraction.

pub mod candidates;
pub mod features;
pub mod model;

pub use candidates::{extract_slot_candidates, SlotCandidate};
pub use features::{build_features, FeatureItem, NerError};
pub use model::{CrfError, CrfModelData, CrfTagger, NullTagger, Tagger};
