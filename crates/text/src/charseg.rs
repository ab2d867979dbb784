use unicode_segmentation::UnicodeSegmentation;

/// Split `text` into its grapheme-level atoms.
///
/// Used both by intent classification (to build a character bag for
/// similarity reranking) and by the custom-dictionary trie lookup (to walk
/// successive suffixes of the raw utterance).
pub fn char_segment(text: &str) -> Vec<String> {
    text.graphemes(true).map(str::to_string).collect()
}
