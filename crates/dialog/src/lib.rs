//! The multi-stage turn state machine: apply external system-dictionary
//! results, resolve an outstanding re-ask, run NER-driven slot filling, then
//! detect resolution. Steps run strictly in that order; this crate is the
//! only place a `Session` is mutated mid-turn.

use thiserror::Error;
use tracing::{debug, instrument, trace};

use clause_dict::{DictKv, DictKvError, DictTrie};
use clause_ner::{build_features, extract_slot_candidates, NerError, Tagger};
use clause_profile::Profile;
use clause_session::{Session, SessionError};
use clause_text::Token;

#[derive(Debug, Error)]
pub enum DialogError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Labeling(#[from] NerError),
    #[error("custom dictionary lookup failed: {0}")]
    Dict(#[from] DictKvError),
}

/// A bot-initiated re-ask: at most one is emitted per turn, carrying the
/// slot's question verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub is_proactive: bool,
}

/// Apply every caller-supplied `(dict_name, val)` pair to every unfilled
/// builtin entity sharing that `dict_name`.
///
/// Documented limitation, preserved literally: if an intent has two
/// unfilled slots bound to the same system dictionary, both receive the
/// *same* value from a single `(dict_name, val)` pair.
pub fn apply_builtins(session: &mut Session, builtins: &[(String, String)]) -> bool {
    let mut progress = false;
    for (dict_name, val) in builtins {
        for entity in session.entities.iter_mut() {
            if entity.builtin && &entity.dict_name == dict_name && entity.val.is_empty() {
                entity.val = val.clone();
                progress = true;
            }
        }
    }
    progress
}

/// Resolve an outstanding re-ask against the raw user text via the
/// custom-dictionary trie. No-ops (returns `Ok(false)`) when the
/// session isn't proactive, or when its target slot was already filled by
/// Step 1. Fails the turn with `MalformedSession` if `is_proactive` is true
/// but `proactive_slotname` is empty.
pub fn resolve_proactive(
    session: &mut Session,
    trie: &DictTrie,
    raw_text: &str,
) -> Result<bool, DialogError> {
    if !session.is_proactive {
        return Ok(false);
    }

    if session.proactive_slotname.is_empty() {
        return Err(DialogError::Session(SessionError::MalformedProactive));
    }

    let still_unfilled = session
        .entity(&session.proactive_slotname)
        .map(|e| !e.is_filled())
        .unwrap_or(false);
    if !still_unfilled {
        return Ok(false);
    }

    match trie.extract_slotvalue(raw_text, &session.proactive_dictname) {
        Some(surface) => {
            let slot_name = session.proactive_slotname.clone();
            session.set_entity_value(&slot_name, surface);
            session.is_proactive = false;
            session.proactive_slotname.clear();
            session.proactive_dictname.clear();
            trace!(slot = %slot_name, "proactive slot resolved via trie lookup");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Build CRF features, decode, extract slot candidates, and fill the first
/// unfilled required slot a verified candidate exists for. Queues a re-ask
/// for the first unfilled required slot with no verified candidate — only
/// one per turn (the `reply` guard is a latch, not a `break`, so later
/// slots are still scanned and filled where possible).
pub fn ner_fill(
    session: &mut Session,
    profile: &Profile,
    tagger: &dyn Tagger,
    kv: &DictKv,
    tokens: &[Token],
) -> Result<(Option<Reply>, bool), DialogError> {
    let terms: Vec<String> = tokens.iter().map(|t| t.term.clone()).collect();
    let pos: Vec<String> = tokens.iter().map(|t| t.pos.clone()).collect();

    let items = build_features(&terms, &pos)?;
    let tags = tagger.tag(&items);
    let candidates = extract_slot_candidates(&terms, &tags);
    debug!(candidates = candidates.len(), "NER candidates extracted");

    let intent = profile
        .intent_by_name(&session.intent_name)
        .ok_or_else(|| SessionError::NoMatchedIntent(session.intent_name.clone()))?;

    let mut reply: Option<Reply> = None;
    let mut progress = false;

    for slot in &intent.slots {
        let already_filled = session
            .entity(&slot.name)
            .map(|e| e.is_filled())
            .unwrap_or(true);
        if already_filled {
            continue;
        }

        let mut settled = false;
        for candidate in candidates.iter().filter(|c| c.slot_name == slot.name) {
            if kv.contains(&slot.dict_name, &candidate.surface)? {
                session.set_entity_value(&slot.name, candidate.surface.clone());
                settled = true;
                progress = true;
                break;
            }
        }

        if !settled && slot.requires && reply.is_none() {
            session.is_proactive = true;
            session.is_fallback = false;
            session.proactive_slotname = slot.name.clone();
            session.proactive_dictname = slot.dict_name.clone();
            reply = Some(Reply {
                text: slot.question.clone(),
                is_proactive: true,
            });
        }
    }

    Ok((reply, progress))
}

/// Run one full turn: apply builtins, resolve any outstanding re-ask, run
/// NER-driven slot filling, then recompute resolution — strictly in that
/// order. The session is left in a structurally valid state on both
/// success and failure paths; a failed turn returns before mutating
/// anything further.
#[instrument(skip_all, fields(intent = %session.intent_name))]
pub fn run_turn(
    profile: &Profile,
    session: &mut Session,
    raw_text: &str,
    tokens: &[Token],
    builtins: &[(String, String)],
    trie: &DictTrie,
    kv: &DictKv,
    tagger: &dyn Tagger,
) -> Result<Option<Reply>, DialogError> {
    session.validate(profile)?;

    let mut progress = apply_builtins(session, builtins);
    progress |= resolve_proactive(session, trie, raw_text)?;

    let (reply, ner_progress) = ner_fill(session, profile, tagger, kv, tokens)?;
    progress |= ner_progress;

    session.recompute_resolved();

    // `is_fallback` tracks "last turn produced no progress". A queued
    // re-ask is progress in its own right — it moves the dialog forward —
    // so it never sets the fallback flag even though no slot was filled.
    if !session.resolved {
        session.is_fallback = reply.is_none() && !progress;
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clause_dict::DictTrie;
    use clause_ner::NullTagger;
    use clause_profile::{Intent, Profile, Slot};

    fn book_flight_profile() -> Profile {
        Profile::new(vec![Intent {
            name: "book_flight".to_string(),
            slots: vec![
                Slot {
                    name: "from".to_string(),
                    dict_name: "@city".to_string(),
                    requires: true,
                    question: "Where are you flying from?".to_string(),
                },
                Slot {
                    name: "to".to_string(),
                    dict_name: "@city".to_string(),
                    requires: true,
                    question: "Where are you flying to?".to_string(),
                },
            ],
        }])
        .unwrap()
    }

    fn bound_session(profile: &Profile) -> Session {
        let mut session = Session::new();
        session.set_session_entities_by_intent_name("book_flight", profile);
        session
    }

    fn toks(pairs: &[(&str, &str)]) -> Vec<Token> {
        pairs.iter().map(|(t, p)| Token::new(*t, *p)).collect()
    }

    // Re-ask emission: CRF returns all O, both slots unfilled.
    #[test]
    fn reask_emission_targets_first_unfilled_required_slot() {
        let profile = book_flight_profile();
        let mut session = bound_session(&profile);
        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("订", "v"), ("机票", "n")]);
        let reply = run_turn(
            &profile,
            &mut session,
            "订机票",
            &tokens,
            &[],
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap();

        let reply = reply.expect("expected a re-ask");
        assert_eq!(reply.text, "Where are you flying from?");
        assert!(reply.is_proactive);
        assert!(session.is_proactive);
        assert_eq!(session.proactive_slotname, "from");
        assert!(!session.resolved);
    }

    // Sysdict fills both slots bound to the same dictionary.
    #[test]
    fn sysdict_fills_slot_and_resolves() {
        let profile = book_flight_profile();
        let mut session = bound_session(&profile);
        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("订", "v"), ("机票", "n")]);
        let builtins = vec![("@city".to_string(), "Beijing".to_string())];
        let reply = run_turn(
            &profile,
            &mut session,
            "订机票",
            &tokens,
            &builtins,
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap();

        assert!(reply.is_none());
        assert_eq!(session.entity("from").unwrap().val, "Beijing");
        assert_eq!(session.entity("to").unwrap().val, "Beijing");
        assert!(session.resolved);
        assert!(!session.is_proactive);
    }

    // Proactive resolution via trie.
    #[test]
    fn proactive_resolution_via_trie() {
        let profile = book_flight_profile();
        let mut session = bound_session(&profile);
        session.is_proactive = true;
        session.proactive_slotname = "from".to_string();
        session.proactive_dictname = "city_cn".to_string();

        let mut trie = DictTrie::new();
        trie.insert("上海", "city_cn");
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("我", "r"), ("从", "p"), ("上海", "ns"), ("出发", "v")]);
        let _reply = run_turn(
            &profile,
            &mut session,
            "我从上海出发",
            &tokens,
            &[],
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap();

        assert_eq!(session.entity("from").unwrap().val, "上海");
        assert!(!session.is_proactive);
        assert!(session.proactive_slotname.is_empty());
    }

    // NER candidate rejected by KV: queues a re-ask instead of filling.
    struct FixedTagger(Vec<String>);
    impl Tagger for FixedTagger {
        fn tag(&self, items: &[clause_ner::FeatureItem]) -> Vec<String> {
            assert_eq!(items.len(), self.0.len());
            self.0.clone()
        }
    }

    #[test]
    fn ner_candidate_rejected_by_kv_queues_reask() {
        let profile = Profile::new(vec![Intent {
            name: "describe_item".to_string(),
            slots: vec![Slot {
                name: "color".to_string(),
                dict_name: "color".to_string(),
                requires: true,
                question: "What color?".to_string(),
            }],
        }])
        .unwrap();
        let mut session = Session::new();
        session.set_session_entities_by_intent_name("describe_item", &profile);

        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        // KV deliberately does NOT contain "ultraviolet" under "color".
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("ultraviolet", "jj")]);
        let tagger = FixedTagger(vec!["B-color".to_string()]);
        let reply = run_turn(
            &profile,
            &mut session,
            "ultraviolet",
            &tokens,
            &[],
            &trie,
            &kv,
            &tagger,
        )
        .unwrap();

        assert!(session.entity("color").unwrap().val.is_empty());
        let reply = reply.expect("color is required, rejected candidate must trigger a re-ask");
        assert_eq!(reply.text, "What color?");
    }

    #[test]
    fn ner_fills_slot_when_kv_verifies_candidate() {
        let profile = Profile::new(vec![Intent {
            name: "describe_item".to_string(),
            slots: vec![Slot {
                name: "color".to_string(),
                dict_name: "color".to_string(),
                requires: true,
                question: "What color?".to_string(),
            }],
        }])
        .unwrap();
        let mut session = Session::new();
        session.set_session_entities_by_intent_name("describe_item", &profile);

        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();
        kv.insert("color", "ultraviolet").unwrap();

        let tokens = toks(&[("ultraviolet", "jj")]);
        let tagger = FixedTagger(vec!["B-color".to_string()]);
        let reply = run_turn(
            &profile,
            &mut session,
            "ultraviolet",
            &tokens,
            &[],
            &trie,
            &kv,
            &tagger,
        )
        .unwrap();

        assert!(reply.is_none());
        assert_eq!(session.entity("color").unwrap().val, "ultraviolet");
        assert!(session.resolved);
    }

    // At most one re-ask queued, targeting the first unfilled required
    // slot in profile order.
    #[test]
    fn only_the_first_unfilled_required_slot_is_reasked() {
        let profile = book_flight_profile();
        let mut session = bound_session(&profile);
        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("订", "v"), ("机票", "n")]);
        let reply = run_turn(
            &profile,
            &mut session,
            "订机票",
            &tokens,
            &[],
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap()
        .unwrap();

        assert_eq!(reply.text, "Where are you flying from?");
        assert_eq!(session.proactive_slotname, "from");
        // "to" is still unfilled too, but only "from" was queued this turn.
        assert!(session.entity("to").unwrap().val.is_empty());
    }

    #[test]
    fn malformed_proactive_session_fails_the_turn() {
        let profile = book_flight_profile();
        let mut session = bound_session(&profile);
        session.is_proactive = true; // proactive_slotname left empty

        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let tokens = toks(&[("订", "v"), ("机票", "n")]);
        let err = run_turn(
            &profile,
            &mut session,
            "订机票",
            &tokens,
            &[],
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DialogError::Session(SessionError::MalformedProactive)
        ));
    }

    #[test]
    fn unbound_session_reports_no_matched_intent() {
        let profile = book_flight_profile();
        let mut session = Session::new();
        session.intent_name = "nonexistent".to_string();

        let trie = DictTrie::new();
        let kv_dir = tempfile::tempdir().unwrap();
        let kv = DictKv::open(kv_dir.path().join("dict.redb")).unwrap();

        let err = run_turn(
            &profile,
            &mut session,
            "x",
            &[],
            &[],
            &trie,
            &kv,
            &NullTagger,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DialogError::Session(SessionError::NoMatchedIntent(_))
        ));
    }
}
