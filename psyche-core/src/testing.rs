//! Testing utilities.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice` returns pre-set die faces in order
//! - `RecordingEffects` captures status effects instead of applying them
//! - `FailingStore` simulates persistence outages
//! - `TestHarness` wires an engine around one fresh character

use crate::dice::{DiceRoller, DieType, RollResult};
use crate::engine::{EngineConfig, PsycheEngine};
use crate::history::{CorruptionHistoryEntry, CorruptionSource, StressHistoryEntry, StressSource};
use crate::meter::{CharacterId, PsycheTracker, Stage};
use crate::panic::StatusEffectService;
use crate::store::{MemoryStore, PsycheStore, StoreError};
use crate::trauma::CharacterTrauma;
use std::collections::VecDeque;

/// Face returned once the script runs out. Neither a success nor a botch.
pub const NEUTRAL_FACE: u32 = 5;

/// Dice that return scripted faces in order.
///
/// Faces are handed out regardless of die type. Once the script is
/// exhausted every die shows [`NEUTRAL_FACE`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
    /// Every roll made, in order.
    pub history: Vec<RollResult>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            history: Vec::new(),
        }
    }

    /// Queue more faces.
    pub fn push(&mut self, faces: impl IntoIterator<Item = u32>) {
        self.faces.extend(faces);
    }

    pub fn remaining(&self) -> usize {
        self.faces.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&mut self, die: DieType, count: u32, modifier: i32) -> RollResult {
        let rolls = (0..count)
            .map(|_| self.faces.pop_front().unwrap_or(NEUTRAL_FACE))
            .collect();
        let result = RollResult::new(die, rolls, modifier);
        self.history.push(result.clone());
        result
    }
}

/// Status-effect service that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    pub applied: Vec<(CharacterId, String, u32)>,
}

impl StatusEffectService for RecordingEffects {
    fn apply_effect(&mut self, character_id: CharacterId, effect_id: &str, duration_turns: u32) {
        self.applied
            .push((character_id, effect_id.to_string(), duration_turns));
    }
}

/// A [`MemoryStore`] whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    /// Writes still allowed before failures start. `None` never fails.
    writes_before_failure: Option<usize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` more writes through, then fail every write after.
    pub fn fail_after(&mut self, n: usize) {
        self.writes_before_failure = Some(n);
    }

    pub fn fail_now(&mut self) {
        self.fail_after(0);
    }

    pub fn recover(&mut self) {
        self.writes_before_failure = None;
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn gate(&mut self) -> Result<(), StoreError> {
        match &mut self.writes_before_failure {
            None => Ok(()),
            Some(0) => Err(StoreError::Unavailable("simulated write failure".to_string())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
        }
    }
}

impl PsycheStore for FailingStore {
    fn create_character(&mut self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        self.gate()?;
        self.inner.create_character(id)
    }

    fn load_tracker(&self, id: CharacterId) -> Result<PsycheTracker, StoreError> {
        self.inner.load_tracker(id)
    }

    fn save_tracker(&mut self, tracker: &PsycheTracker) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.save_tracker(tracker)
    }

    fn commit_stress(
        &mut self,
        tracker: &PsycheTracker,
        entry: &StressHistoryEntry,
    ) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.commit_stress(tracker, entry)
    }

    fn commit_corruption(
        &mut self,
        tracker: &PsycheTracker,
        entry: &CorruptionHistoryEntry,
    ) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.commit_corruption(tracker, entry)
    }

    fn commit_transfer(
        &mut self,
        donor: (&PsycheTracker, &CorruptionHistoryEntry),
        recipient: (&PsycheTracker, &CorruptionHistoryEntry),
    ) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.commit_transfer(donor, recipient)
    }

    fn stress_history(&self, id: CharacterId) -> Result<Vec<StressHistoryEntry>, StoreError> {
        self.inner.stress_history(id)
    }

    fn corruption_history(
        &self,
        id: CharacterId,
    ) -> Result<Vec<CorruptionHistoryEntry>, StoreError> {
        self.inner.corruption_history(id)
    }

    fn traumas(&self, id: CharacterId) -> Result<Vec<CharacterTrauma>, StoreError> {
        self.inner.traumas(id)
    }

    fn save_trauma(&mut self, trauma: &CharacterTrauma) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.save_trauma(trauma)
    }

    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.delete_character(id)
    }
}

/// Engine type used by the harness.
pub type TestEngine = PsycheEngine<MemoryStore, ScriptedDice, RecordingEffects>;

/// An engine with one freshly created character.
pub struct TestHarness {
    pub engine: TestEngine,
    pub character: CharacterId,
}

impl TestHarness {
    /// Harness whose dice always show neutral faces.
    pub fn new() -> Self {
        Self::with_dice(std::iter::empty())
    }

    pub fn with_dice(faces: impl IntoIterator<Item = u32>) -> Self {
        Self::with_config(EngineConfig::new(), faces)
    }

    /// Create a harness with custom content.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory store refuses the new character, which only
    /// happens on a broken store implementation.
    pub fn with_config(config: EngineConfig, faces: impl IntoIterator<Item = u32>) -> Self {
        let mut engine = PsycheEngine::new(
            MemoryStore::new(),
            ScriptedDice::new(faces),
            RecordingEffects::default(),
            config,
        );
        let character = CharacterId::new();
        engine
            .create_character(character)
            .expect("fresh memory store accepts a new character");
        Self { engine, character }
    }

    /// Queue more dice faces.
    pub fn script_dice(&mut self, faces: impl IntoIterator<Item = u32>) {
        self.engine.dice_mut().push(faces);
    }

    /// Drive stress to `value` through the engine, recording history.
    ///
    /// # Panics
    ///
    /// Panics if the engine rejects the change.
    pub fn set_stress(&mut self, value: i32) {
        let current = self.stress();
        let result = if value >= current {
            self.engine
                .apply_stress(self.character, value - current, StressSource::Administrative, None)
        } else {
            self.engine
                .recover_stress_by(self.character, current - value, StressSource::Administrative)
        };
        result.expect("harness stress change");
    }

    /// Drive corruption to `value` through the engine, recording history.
    ///
    /// # Panics
    ///
    /// Panics if the engine rejects the change.
    pub fn set_corruption(&mut self, value: i32) {
        let current = self.corruption();
        let result = if value >= current {
            self.engine
                .add_corruption(self.character, value - current, CorruptionSource::Administrative)
        } else {
            self.engine.remove_corruption(
                self.character,
                current - value,
                CorruptionSource::Administrative,
            )
        };
        result.expect("harness corruption change");
    }

    /// # Panics
    ///
    /// Panics if the character is missing from the store.
    pub fn stress(&self) -> i32 {
        self.engine
            .tracker(self.character)
            .expect("harness character exists")
            .stress()
            .value()
    }

    /// # Panics
    ///
    /// Panics if the character is missing from the store.
    pub fn corruption(&self) -> i32 {
        self.engine
            .tracker(self.character)
            .expect("harness character exists")
            .corruption()
            .value()
    }

    /// Create another character in the same engine.
    ///
    /// # Panics
    ///
    /// Panics if the store refuses the character.
    pub fn add_character(&mut self) -> CharacterId {
        let id = CharacterId::new();
        self.engine
            .create_character(id)
            .expect("fresh memory store accepts a new character");
        id
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the character's stress is in the expected stage.
#[track_caller]
pub fn assert_stress_stage(harness: &TestHarness, expected: Stage) {
    let actual = Stage::of(harness.stress());
    assert_eq!(
        actual, expected,
        "Expected stress stage {expected}, got {actual} (stress {})",
        harness.stress()
    );
}

/// Assert that replaying the history reproduces the live meters.
///
/// Each entry must start where the previous one ended, and the last entry
/// must end at the current value.
#[track_caller]
pub fn assert_history_consistent<S: PsycheStore>(store: &S, id: CharacterId) {
    let tracker = store.load_tracker(id).expect("tracker exists");

    let mut stress = 0;
    for entry in store.stress_history(id).expect("stress history readable") {
        assert_eq!(entry.previous_value, stress, "stress history gap at {entry:?}");
        assert_eq!(entry.new_value - entry.previous_value, entry.final_amount);
        stress = entry.new_value;
    }
    assert_eq!(stress, tracker.stress().value(), "stress history disagrees with meter");

    let mut corruption = 0;
    for entry in store.corruption_history(id).expect("corruption history readable") {
        assert_eq!(
            entry.previous_value, corruption,
            "corruption history gap at {entry:?}"
        );
        assert_eq!(entry.new_value - entry.previous_value, entry.final_amount);
        corruption = entry.new_value;
    }
    assert_eq!(
        corruption,
        tracker.corruption().value(),
        "corruption history disagrees with meter"
    );
}
