//! Session model: per-conversation state and its mutation API.
//!
//! Everything here is deliberately "dumb" — no dialog logic lives in this
//! crate, only the invariants of the data model and the single binding
//! operation that establishes them. `clause-dialog` is the only crate that
//! drives a `Session` through a turn.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use clause_profile::Profile;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is proactive but has no proactive_slotname set")]
    MalformedProactive,
    #[error("session intent_name {0:?} is not present in the profile")]
    NoMatchedIntent(String),
}

/// One slot of the bound intent, materialized onto the session.
///
/// `builtin` is fixed at creation time; only `val` changes turn to turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub dict_name: String,
    pub requires: bool,
    pub builtin: bool,
    pub val: String,
}

impl Entity {
    pub fn is_filled(&self) -> bool {
        !self.val.is_empty()
    }
}

/// Per-conversation mutable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub intent_name: String,
    pub entities: Vec<Entity>,
    pub is_proactive: bool,
    pub proactive_slotname: String,
    pub proactive_dictname: String,
    pub is_fallback: bool,
    pub resolved: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    /// Set an entity's value by name.
    ///
    /// Reports success (`true`) even when no entity with that name exists
    /// on the session, silently no-opping instead of erroring. Preserved
    /// literally as a documented behavior, not treated as a bug to fix.
    pub fn set_entity_value(&mut self, name: &str, val: impl Into<String>) -> bool {
        match self.entity_mut(name) {
            Some(entity) => {
                entity.val = val.into();
                true
            }
            None => {
                trace!(entity = name, "set_entity_value: no matching entity, no-op");
                true
            }
        }
    }

    /// Bind the session to a new intent: clears `entities` first, then
    /// appends one `Entity` per slot of `name`'s profile
    /// definition, in profile order, with `val` empty.
    ///
    /// Returns `false` (leaving `entities` cleared but `intent_name`
    /// unchanged) if no such intent exists in the profile.
    pub fn set_session_entities_by_intent_name(&mut self, name: &str, profile: &Profile) -> bool {
        self.entities.clear();

        let Some(intent) = profile.intent_by_name(name) else {
            return false;
        };

        self.entities = intent
            .slots
            .iter()
            .map(|slot| Entity {
                name: slot.name.clone(),
                dict_name: slot.dict_name.clone(),
                requires: slot.requires,
                builtin: slot.is_builtin(),
                val: String::new(),
            })
            .collect();
        self.intent_name = name.to_string();
        true
    }

    /// Re-entry with a new intent clears `entities` first — same
    /// operation as initial binding.
    pub fn rebind(&mut self, name: &str, profile: &Profile) -> bool {
        self.is_proactive = false;
        self.proactive_slotname.clear();
        self.proactive_dictname.clear();
        self.is_fallback = false;
        self.resolved = false;
        self.set_session_entities_by_intent_name(name, profile)
    }

    /// Whether every `requires=true` slot currently has a non-empty `val`.
    pub fn all_required_filled(&self) -> bool {
        self.entities
            .iter()
            .filter(|e| e.requires)
            .all(|e| e.is_filled())
    }

    /// Recompute `resolved` from `entities` and, when true, clear every
    /// proactive/fallback field.
    pub fn recompute_resolved(&mut self) {
        self.resolved = self.all_required_filled();
        if self.resolved {
            self.is_proactive = false;
            self.is_fallback = false;
            self.proactive_slotname.clear();
            self.proactive_dictname.clear();
        }
    }

    /// Validate the structural invariants a dialog turn depends on before
    /// it starts, surfacing `MalformedProactive`/`NoMatchedIntent` when
    /// they don't hold.
    pub fn validate(&self, profile: &Profile) -> Result<(), SessionError> {
        let intent = profile
            .intent_by_name(&self.intent_name)
            .ok_or_else(|| SessionError::NoMatchedIntent(self.intent_name.clone()))?;

        if self.is_proactive && self.proactive_slotname.is_empty() {
            return Err(SessionError::MalformedProactive);
        }

        debug_assert_eq!(
            self.entities.len(),
            intent.slots.len(),
            "entities must enumerate exactly the bound intent's slots"
        );

        Ok(())
    }
}
