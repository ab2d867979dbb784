//! Bot facade: a process-wide, read-mostly handle that owns the
//! profile, trie, KV store, recall index, tokenizer, and CRF tagger, and
//! exposes the two entry points a caller needs — `classify` and `chat`.
//!
//! Subresources are acquired in a fixed order (tokenizer, recall, tagger,
//! trie, kv, profile) and released in the reverse order on drop. Field
//! declaration order below is the reverse of acquisition order so the
//! compiler's natural top-to-bottom field drop does the releasing; `Drop`
//! only adds the log line.

use std::fs;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use clause_config::BotConfig;
pub use clause_dialog::{DialogError, Reply};
use clause_dialog::run_turn;
use clause_dict::{DictKv, DictKvError, DictTrie, TrieError};
use clause_ner::{CrfTagger, NullTagger, Tagger};
pub use clause_profile::{Intent, Profile, ProfileError, Slot};
use clause_recall::{char_bag_similarity, RecallError, RecallIndex};
pub use clause_session::{Entity, Session, SessionError};
pub use clause_text::{Token, Tokenizer};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("failed to load recall index: {0}")]
    Recall(#[from] RecallError),
    #[error("failed to load custom-dictionary trie: {0}")]
    Trie(#[from] TrieError),
    #[error("failed to load custom-dictionary kv store: {0}")]
    Kv(#[from] DictKvError),
    #[error("failed to load intent profile: {0}")]
    Profile(#[from] ProfileError),
    #[error("failed to prepare bundle directory {path}: {source}")]
    BundleDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dialog(#[from] DialogError),
}

/// The filenames this core expects under `<workarea>/<bot_id>/<build_version>/`.
/// Real jieba/xapian/leveldb artifacts are external build outputs; the paths
/// below are our own substitute serializations for the same bundle *roles*,
/// each crate's own module doc explains the substitution.
mod layout {
    pub const RECALL_CORPUS: &str = "xapian/corpus.bin";
    pub const CRF_MODEL: &str = "crfsuite.ner.model";
    pub const TRIE: &str = "dictwords.trie.bin";
    pub const KV_DIR: &str = "leveldb";
    pub const KV_FILE: &str = "leveldb/dictkv.redb";
    pub const PROFILE: &str = "profile.pbs";
}

/// Process-wide, read-mostly handle owning every subresource a turn needs.
/// The recall index is internally synchronized for concurrent readers;
/// everything else is read-only after `open`.
pub struct Bot {
    bot_id: String,
    branch: String,
    build_version: String,
    intent_classify_threshold: f32,

    // Declared in reverse acquisition order so `Drop` releases
    // profile -> kv -> trie -> tagger -> recall -> tokenizer.
    profile: Profile,
    kv: DictKv,
    trie: DictTrie,
    tagger: Box<dyn Tagger>,
    /// Set when the CRF model failed to load at init — a soft failure:
    /// the bot stays usable for classification, but NER degrades to an
    /// always-`O` tagger and yields no slot candidates.
    ner_degraded: bool,
    recall: RecallIndex,
    tokenizer: Box<dyn Tokenizer>,
}

impl Bot {
    /// Acquire every subresource for `<bot_id>/<build_version>` under the
    /// configured workarea, in documented order. Any missing or corrupt
    /// artifact except the CRF model is fatal; a missing/corrupt CRF model
    /// only flips `ner_degraded` and logs a warning.
    #[instrument(skip(config, tokenizer), fields(bot_id = %bot_id.as_ref(), build_version = %build_version.as_ref()))]
    pub fn open(
        bot_id: impl AsRef<str>,
        branch: impl AsRef<str>,
        build_version: impl AsRef<str>,
        config: &BotConfig,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<Self, BotError> {
        let bundle_dir = config
            .bundle_dir(bot_id.as_ref(), build_version.as_ref());

        let recall = RecallIndex::load(
            bundle_dir.join(layout::RECALL_CORPUS),
            config.recall.elite_set_size,
            config.recall.top_n,
        )?;
        debug!("recall index loaded");

        let (tagger, ner_degraded): (Box<dyn Tagger>, bool) =
            match CrfTagger::open(bundle_dir.join(layout::CRF_MODEL)) {
                Ok(tagger) => (Box::new(tagger), false),
                Err(err) => {
                    warn!(error = %err, "CRF model failed to load; NER degraded to empty candidates");
                    (Box::new(NullTagger), true)
                }
            };

        let trie = DictTrie::load(bundle_dir.join(layout::TRIE))?;

        fs::create_dir_all(bundle_dir.join(layout::KV_DIR)).map_err(|source| {
            BotError::BundleDir {
                path: bundle_dir.join(layout::KV_DIR).display().to_string(),
                source,
            }
        })?;
        let kv = DictKv::open(bundle_dir.join(layout::KV_FILE))?;

        let profile = Profile::load(bundle_dir.join(layout::PROFILE))?;
        debug!(intents = profile.intents().len(), "profile loaded");

        Ok(Self {
            bot_id: bot_id.as_ref().to_string(),
            branch: branch.as_ref().to_string(),
            build_version: build_version.as_ref().to_string(),
            intent_classify_threshold: config.runtime.intent_classify_threshold,
            profile,
            kv,
            trie,
            tagger,
            ner_degraded,
            recall,
            tokenizer,
        })
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    pub fn ner_degraded(&self) -> bool {
        self.ner_degraded
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn tokenize(&self, query: &str) -> Vec<Token> {
        self.tokenizer.tokenize(query)
    }

    /// Intent classification: elite-set recall over the labeled-utterance
    /// corpus, then character-bag similarity reranking. Deterministic for a
    /// fixed index and threshold.
    #[instrument(skip(self, tokens))]
    pub fn classify(&self, tokens: &[Token]) -> Option<String> {
        let query_terms: Vec<String> = tokens.iter().map(|t| t.term.clone()).collect();
        // The recall index's own `search` reopens its reader before running
        // and applies the elite-set (dedupe + cap-at-K) equivalence
        // internally (see `DESIGN.md`'s elite-set note).
        let matches = match self.recall.search(&query_terms) {
            Ok(matches) => matches,
            Err(err) => {
                warn!(error = %err, "recall search failed; classification reports no match");
                return None;
            }
        };
        if matches.is_empty() {
            return None;
        }

        // Character bag similarity is computed against the reconstructed
        // query text (the concatenation of token surfaces) — the core never
        // sees the caller's unsegmented raw string at this interface;
        // `classify(tokens)` takes only term/pos pairs.
        let query_text: String = query_terms.concat();

        let mut scored: Vec<(f32, &clause_recall::RecallMatch)> = matches
            .iter()
            .map(|m| (char_bag_similarity(&query_text, &m.utterance), m))
            .collect();
        // Stable sort: ties keep retrieval order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .find(|(score, _)| *score >= self.intent_classify_threshold)
            .map(|(_, m)| m.intent_name.clone())
    }

    /// Bind `session` to `intent_name`, replacing any prior binding.
    /// Returns `false` if the profile has no such intent.
    pub fn bind_intent(&self, session: &mut Session, intent_name: &str) -> bool {
        session.rebind(intent_name, &self.profile)
    }

    /// Run one dialog turn: apply system-dictionary results, resolve any
    /// outstanding re-ask, run NER-driven slot filling, then detect
    /// resolution.
    #[instrument(skip(self, session, tokens, builtins))]
    pub fn chat(
        &self,
        raw_text: &str,
        tokens: &[Token],
        builtins: &[(String, String)],
        mut session: Session,
    ) -> Result<(Session, Option<Reply>), DialogError> {
        let reply = run_turn(
            &self.profile,
            &mut session,
            raw_text,
            tokens,
            builtins,
            &self.trie,
            &self.kv,
            self.tagger.as_ref(),
        )?;
        Ok((session, reply))
    }

    /// Top-level control flow of a turn: if `session` has no bound intent
    /// yet, classify and bind it (no dialog runs this turn); otherwise run
    /// the dialog state machine.
    #[instrument(skip(self, session, builtins))]
    pub fn turn(
        &self,
        raw_text: &str,
        builtins: &[(String, String)],
        mut session: Session,
    ) -> Result<(Session, Option<Reply>), BotError> {
        let tokens = self.tokenize(raw_text);

        if session.intent_name.is_empty() {
            match self.classify(&tokens) {
                Some(intent_name) => {
                    self.bind_intent(&mut session, &intent_name);
                }
                None => debug!("classify found no matching intent"),
            }
            return Ok((session, None));
        }

        let (session, reply) = self.chat(raw_text, &tokens, builtins, session)?;
        Ok((session, reply))
    }
}

impl Drop for Bot {
    fn drop(&mut self) {
        debug!(bot_id = %self.bot_id, "releasing bot resources in reverse acquisition order");
    }
}
