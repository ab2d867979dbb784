//! Slot-candidate extraction from BIO tag sequences.

/// One extracted `(slot_name, surface)` pair, not yet validated against any
/// dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCandidate {
    pub slot_name: String,
    pub surface: String,
}

/// Scan `terms`/`tags` left to right, turning `B-<name>`/`I-<name>` spans
/// into candidates. `B-@…` tags are POS annotations, not entities, and are
/// skipped. Returns an empty list (not an error) on length mismatch or
/// empty input — this stage never fails the turn.
pub fn extract_slot_candidates(terms: &[String], tags: &[String]) -> Vec<SlotCandidate> {
    if terms.is_empty() || terms.len() != tags.len() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let n = terms.len();
    let mut i = 0;

    while i < n {
        let tag = &tags[i];
        if let Some(rest) = tag.strip_prefix("B-") {
            if rest.starts_with('@') {
                // A POS tag riding on the B- prefix, not a slot entity.
                i += 1;
                continue;
            }

            let name = rest.to_string();
            let inside_tag = format!("I-{name}");
            let mut j = i + 1;
            while j < n && tags[j] == inside_tag {
                j += 1;
            }

            let surface: String = terms[i..j].concat();
            candidates.push(SlotCandidate {
                slot_name: name,
                surface,
            });
            i = j;
        } else {
            i += 1;
        }
    }

    candidates
}
