//! CRF feature-window construction.
//!
//! Every feature name below is part of the model contract: a CRF trained
//! against these literal strings must see them bit-identical at decode
//! time, so the window shape is *not* a tuning knob.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NerError {
    #[error("labeling data mismatch: {terms} terms but {pos} pos tags")]
    InvalidLabelingData { terms: usize, pos: usize },
}

/// The feature set active at one sequence position. A CRF implementation
/// treats this as a bag — order within an item carries no meaning.
pub type FeatureItem = Vec<String>;

fn offset_tag(offset: i32) -> String {
    match offset.cmp(&0) {
        std::cmp::Ordering::Equal => "t".to_string(),
        std::cmp::Ordering::Less => format!("t{offset}"),
        std::cmp::Ordering::Greater => format!("t+{offset}"),
    }
}

fn in_range(t: i32, offset: i32, n: i32) -> Option<usize> {
    let idx = t + offset;
    if idx >= 0 && idx < n {
        Some(idx as usize)
    } else {
        None
    }
}

/// Build one window's feature item, given position `t` (as `i32` for
/// comfortable arithmetic against negative offsets) and the sequence length.
fn build_item(t: i32, n: i32, terms: &[String], pos: &[String]) -> FeatureItem {
    let mut feats = Vec::new();

    if t == 0 {
        feats.push("__BOS__".to_string());
    }
    if t == n - 1 {
        feats.push("__EOS__".to_string());
    }

    let w = |offset: i32| in_range(t, offset, n).map(|i| terms[i].as_str());
    // POS values are namespaced with `@` so a word and a POS tag that
    // happen to share a string never collide in the CRF's feature space.
    let p = |offset: i32| in_range(t, offset, n).map(|i| format!("@{}", pos[i]));

    for offset in [-2, -1, 0, 1, 2] {
        if let Some(value) = w(offset) {
            feats.push(format!("w[{}]={}", offset_tag(offset), value));
        }
    }
    for (a, b) in [(-1, 0), (0, 1)] {
        if let (Some(va), Some(vb)) = (w(a), w(b)) {
            feats.push(format!(
                "w[{}]|w[{}]={va}|{vb}",
                offset_tag(a),
                offset_tag(b)
            ));
        }
    }

    for offset in [-2, -1, 0, 1, 2] {
        if let Some(value) = p(offset) {
            feats.push(format!("p[{}]={}", offset_tag(offset), value));
        }
    }
    for (a, b) in [(-2, -1), (-1, 0), (0, 1), (1, 2)] {
        if let (Some(va), Some(vb)) = (p(a), p(b)) {
            feats.push(format!(
                "p[{}]|p[{}]={va}|{vb}",
                offset_tag(a),
                offset_tag(b)
            ));
        }
    }
    for (a, b, c) in [(-2, -1, 0), (-1, 0, 1), (0, 1, 2)] {
        if let (Some(va), Some(vb), Some(vc)) = (p(a), p(b), p(c)) {
            feats.push(format!(
                "p[{}]|p[{}]|p[{}]={va}|{vb}|{vc}",
                offset_tag(a),
                offset_tag(b),
                offset_tag(c)
            ));
        }
    }

    feats
}

/// Produce one feature item per position of `terms`/`pos`.
///
/// Uses the `t+1`/`t+2` offsets literally — an earlier revision of this
/// window indexed `term+1`/`pos+1` directly, which silently skips a
/// position whenever `t` isn't 0; that offset arithmetic is not repeated
/// here.
pub fn build_features(terms: &[String], pos: &[String]) -> Result<Vec<FeatureItem>, NerError> {
    if terms.len() != pos.len() {
        return Err(NerError::InvalidLabelingData {
            terms: terms.len(),
            pos: pos.len(),
        });
    }

    let n = terms.len() as i32;
    Ok((0..n).map(|t| build_item(t, n, terms, pos)).collect())
}
