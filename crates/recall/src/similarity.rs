//! Character-bag similarity: reranks recall candidates by how much of the
//! query's character multiset is shared with a stored utterance,
//! independent of word order or tokenization.

use std::collections::HashMap;

use clause_text::char_segment;

fn char_bag(text: &str) -> HashMap<String, usize> {
    let mut bag = HashMap::new();
    for ch in char_segment(text) {
        *bag.entry(ch).or_insert(0usize) += 1;
    }
    bag
}

/// Sorensen-Dice coefficient over character multisets: `2 * |shared| / (|a| + |b|)`,
/// where `|shared|` counts each character up to the minimum multiplicity in
/// both bags. Returns `0.0` when both inputs are empty.
pub fn char_bag_similarity(a: &str, b: &str) -> f32 {
    let bag_a = char_bag(a);
    let bag_b = char_bag(b);

    let len_a: usize = bag_a.values().sum();
    let len_b: usize = bag_b.values().sum();
    if len_a + len_b == 0 {
        return 0.0;
    }

    let shared: usize = bag_a
        .iter()
        .map(|(ch, count_a)| {
            let count_b = bag_b.get(ch).copied().unwrap_or(0);
            (*count_a).min(count_b)
        })
        .sum();

    (2 * shared) as f32 / (len_a + len_b) as f32
}
