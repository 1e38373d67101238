//! Storage boundary for meters, history and held traumas.
//!
//! A store must commit a meter write and the history entry describing it
//! together or not at all. [`MemoryStore`] is the in-process implementation;
//! [`SqliteStore`](crate::persist::SqliteStore) is the durable one.

use crate::history::{CorruptionHistoryEntry, StressHistoryEntry};
use crate::meter::{CharacterId, PsycheTracker};
use crate::persist::PersistError;
use crate::trauma::CharacterTrauma;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Character not found: {0}")]
    CharacterNotFound(CharacterId),

    #[error("Character already exists: {0}")]
    CharacterExists(CharacterId),

    #[error("History entry for {entry} does not belong to tracker {tracker}")]
    MismatchedEntry {
        tracker: CharacterId,
        entry: CharacterId,
    },

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence used by [`PsycheEngine`](crate::engine::PsycheEngine).
pub trait PsycheStore {
    /// Create fresh meters and flags for a new character.
    fn create_character(&mut self, id: CharacterId) -> Result<PsycheTracker, StoreError>;

    /// Current authoritative meters for a character.
    fn load_tracker(&self, id: CharacterId) -> Result<PsycheTracker, StoreError>;

    /// Write tracker state that carries no meter change (flag resets).
    fn save_tracker(&mut self, tracker: &PsycheTracker) -> Result<(), StoreError>;

    /// Write the stress meter and append its history entry atomically.
    fn commit_stress(
        &mut self,
        tracker: &PsycheTracker,
        entry: &StressHistoryEntry,
    ) -> Result<(), StoreError>;

    /// Write the corruption meter and flags and append their history entry atomically.
    fn commit_corruption(
        &mut self,
        tracker: &PsycheTracker,
        entry: &CorruptionHistoryEntry,
    ) -> Result<(), StoreError>;

    /// Commit both sides of a corruption transfer atomically.
    fn commit_transfer(
        &mut self,
        donor: (&PsycheTracker, &CorruptionHistoryEntry),
        recipient: (&PsycheTracker, &CorruptionHistoryEntry),
    ) -> Result<(), StoreError>;

    /// Stress history ordered by creation time.
    fn stress_history(&self, id: CharacterId) -> Result<Vec<StressHistoryEntry>, StoreError>;

    /// Corruption history ordered by creation time.
    fn corruption_history(&self, id: CharacterId)
        -> Result<Vec<CorruptionHistoryEntry>, StoreError>;

    /// Traumas held by a character, oldest first.
    fn traumas(&self, id: CharacterId) -> Result<Vec<CharacterTrauma>, StoreError>;

    /// Insert or replace a held trauma.
    fn save_trauma(&mut self, trauma: &CharacterTrauma) -> Result<(), StoreError>;

    /// Delete a character's meters and traumas. History is kept.
    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError>;
}

fn check_entry(tracker: &PsycheTracker, entry: CharacterId) -> Result<(), StoreError> {
    if tracker.character_id != entry {
        return Err(StoreError::MismatchedEntry {
            tracker: tracker.character_id,
            entry,
        });
    }
    Ok(())
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    trackers: HashMap<CharacterId, PsycheTracker>,
    stress_history: Vec<StressHistoryEntry>,
    corruption_history: Vec<CorruptionHistoryEntry>,
    traumas: HashMap<CharacterId, Vec<CharacterTrauma>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn require(&self, id: CharacterId) -> Result<(), StoreError> {
        if self.trackers.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::CharacterNotFound(id))
        }
    }
}

impl PsycheStore for MemoryStore {
    fn create_character(&mut self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        if self.trackers.contains_key(&id) {
            return Err(StoreError::CharacterExists(id));
        }
        let tracker = PsycheTracker::new(id);
        self.trackers.insert(id, tracker.clone());
        Ok(tracker)
    }

    fn load_tracker(&self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        self.trackers
            .get(&id)
            .cloned()
            .ok_or(StoreError::CharacterNotFound(id))
    }

    fn save_tracker(&mut self, tracker: &PsycheTracker) -> Result<(), StoreError> {
        self.require(tracker.character_id)?;
        self.trackers.insert(tracker.character_id, tracker.clone());
        Ok(())
    }

    fn commit_stress(
        &mut self,
        tracker: &PsycheTracker,
        entry: &StressHistoryEntry,
    ) -> Result<(), StoreError> {
        check_entry(tracker, entry.character_id)?;
        self.require(tracker.character_id)?;
        self.trackers.insert(tracker.character_id, tracker.clone());
        self.stress_history.push(entry.clone());
        Ok(())
    }

    fn commit_corruption(
        &mut self,
        tracker: &PsycheTracker,
        entry: &CorruptionHistoryEntry,
    ) -> Result<(), StoreError> {
        check_entry(tracker, entry.character_id)?;
        self.require(tracker.character_id)?;
        self.trackers.insert(tracker.character_id, tracker.clone());
        self.corruption_history.push(entry.clone());
        Ok(())
    }

    fn commit_transfer(
        &mut self,
        donor: (&PsycheTracker, &CorruptionHistoryEntry),
        recipient: (&PsycheTracker, &CorruptionHistoryEntry),
    ) -> Result<(), StoreError> {
        for (tracker, entry) in [donor, recipient] {
            check_entry(tracker, entry.character_id)?;
            self.require(tracker.character_id)?;
        }
        for (tracker, entry) in [donor, recipient] {
            self.trackers.insert(tracker.character_id, tracker.clone());
            self.corruption_history.push(entry.clone());
        }
        Ok(())
    }

    fn stress_history(&self, id: CharacterId) -> Result<Vec<StressHistoryEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .stress_history
            .iter()
            .filter(|e| e.character_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn corruption_history(
        &self,
        id: CharacterId,
    ) -> Result<Vec<CorruptionHistoryEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .corruption_history
            .iter()
            .filter(|e| e.character_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn traumas(&self, id: CharacterId) -> Result<Vec<CharacterTrauma>, StoreError> {
        self.require(id)?;
        Ok(self.traumas.get(&id).cloned().unwrap_or_default())
    }

    fn save_trauma(&mut self, trauma: &CharacterTrauma) -> Result<(), StoreError> {
        self.require(trauma.character_id)?;
        let held = self.traumas.entry(trauma.character_id).or_default();
        match held.iter_mut().find(|t| t.trauma_id == trauma.trauma_id) {
            Some(existing) => *existing = trauma.clone(),
            None => held.push(trauma.clone()),
        }
        Ok(())
    }

    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError> {
        self.trackers
            .remove(&id)
            .ok_or(StoreError::CharacterNotFound(id))?;
        self.traumas.remove(&id);
        Ok(())
    }
}
