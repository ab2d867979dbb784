//! Intent profile: the compiled, read-only catalog of intents and slots for
//! one bot build. Loaded once at bot init and never mutated afterward.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode profile: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to encode profile: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("duplicate intent name in profile: {0}")]
    DuplicateIntent(String),
    #[error("duplicate slot name {slot} within intent {intent}")]
    DuplicateSlot { intent: String, slot: String },
}

/// A single named parameter of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub name: String,
    /// Starts with `@` iff this references a system dictionary.
    pub dict_name: String,
    pub requires: bool,
    /// Verbatim re-ask prompt shown to the user when this slot is required
    /// and remains unfilled.
    pub question: String,
}

impl Slot {
    pub fn is_builtin(&self) -> bool {
        self.dict_name.starts_with('@')
    }
}

/// A user goal the bot is trained to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    pub slots: Vec<Slot>,
}

/// The full, ordered catalog of intents for one bot build, plus the set of
/// system dictionaries it refers to (derived once at load, not stored on
/// disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    intents: Vec<Intent>,
    #[serde(skip)]
    referred_sysdicts: HashSet<String>,
}

impl Profile {
    /// Build a profile from an already-deserialized intent list, validating
    /// the uniqueness invariants of the data model: intent names are unique
    /// across the profile, slot names are unique within an intent.
    pub fn new(intents: Vec<Intent>) -> Result<Self, ProfileError> {
        let mut seen_intents = HashSet::new();
        for intent in &intents {
            if !seen_intents.insert(intent.name.clone()) {
                return Err(ProfileError::DuplicateIntent(intent.name.clone()));
            }

            let mut seen_slots = HashSet::new();
            for slot in &intent.slots {
                if !seen_slots.insert(slot.name.clone()) {
                    return Err(ProfileError::DuplicateSlot {
                        intent: intent.name.clone(),
                        slot: slot.name.clone(),
                    });
                }
            }
        }

        let referred_sysdicts = intents
            .iter()
            .flat_map(|i| i.slots.iter())
            .map(|s| s.dict_name.clone())
            .filter(|d| d.starts_with('@'))
            .collect();

        Ok(Self {
            intents,
            referred_sysdicts,
        })
    }

    /// Deserialize `profile.pbs` (a bincode-encoded `Vec<Intent>`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path_ref = path.as_ref();
        let bytes = fs::read(path_ref).map_err(|source| ProfileError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        let (intents, _) = bincode::serde::decode_from_slice::<Vec<Intent>, _>(
            &bytes,
            bincode::config::standard(),
        )?;
        Self::new(intents)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let bytes = bincode::serde::encode_to_vec(&self.intents, bincode::config::standard())?;
        fs::write(path.as_ref(), bytes).map_err(|source| ProfileError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn intent_by_name(&self, name: &str) -> Option<&Intent> {
        self.intents.iter().find(|i| i.name == name)
    }

    /// Distinct `dict_name` values beginning with `@`, across every slot of
    /// every intent. Used to request the external system-dictionary service
    /// and to mark session entities as built-in.
    pub fn referred_sysdicts(&self) -> &HashSet<String> {
        &self.referred_sysdicts
    }

    pub fn has_referred_sysdict(&self, dict_name: &str) -> bool {
        self.referred_sysdicts.contains(dict_name)
    }
}
