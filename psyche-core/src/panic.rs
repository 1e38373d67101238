//! The panic table.
//!
//! A character whose stress sits in [`Stage::SevereInstability`] may be made
//! to roll a single d10 on the panic table. Every face maps to exactly one
//! [`PanicEffect`]. The table is content: [`PanicTable::default`] ships a
//! complete one and [`PanicTable::from_json_str`] loads a replacement.
//!
//! [`Stage::SevereInstability`]: crate::meter::Stage::SevereInstability

use crate::dice::{DiceRoller, DieType};
use crate::meter::CharacterId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const PANIC_DIE: DieType = DieType::D10;

#[derive(Debug, Error)]
pub enum PanicTableError {
    #[error("Panic table entry {name:?} has invalid range {min}..={max}")]
    InvalidRange { name: String, min: u32, max: u32 },
    #[error("Panic table maps roll {roll} more than once")]
    Overlap { roll: u32 },
    #[error("Panic table has no entry for roll {roll}")]
    Unmapped { roll: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanicEffect {
    Paralysis,
    Outcry,
    Flight,
    Collapse,
    Blackout,
    Denial,
    Violence,
    Catatonia,
    Dissociation,
    NoEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForcedAction {
    FleeFromSource,
    AttackNearest,
    RandomAction,
}

/// One row of the panic table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicTableEntry {
    pub min_roll: u32,
    pub max_roll: u32,
    pub effect: PanicEffect,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub duration_turns: Option<u32>,
    #[serde(default)]
    pub self_damage: Option<u32>,
    #[serde(default)]
    pub status_effects: Vec<String>,
    #[serde(default)]
    pub forced_action: Option<ForcedAction>,
}

impl PanicTableEntry {
    fn new(roll: u32, effect: PanicEffect, name: &str, description: &str) -> Self {
        Self {
            min_roll: roll,
            max_roll: roll,
            effect,
            name: name.to_string(),
            description: description.to_string(),
            duration_turns: None,
            self_damage: None,
            status_effects: Vec::new(),
            forced_action: None,
        }
    }

    fn lasting(mut self, turns: u32) -> Self {
        self.duration_turns = Some(turns);
        self
    }

    fn with_status(mut self, effects: &[&str]) -> Self {
        self.status_effects = effects.iter().map(|e| e.to_string()).collect();
        self
    }

    fn with_self_damage(mut self, damage: u32) -> Self {
        self.self_damage = Some(damage);
        self
    }

    fn forcing(mut self, action: ForcedAction) -> Self {
        self.forced_action = Some(action);
        self
    }

    fn covers(&self, roll: u32) -> bool {
        (self.min_roll..=self.max_roll).contains(&roll)
    }
}

lazy_static::lazy_static! {
    static ref DEFAULT_ENTRIES: Vec<PanicTableEntry> = vec![
        PanicTableEntry::new(1, PanicEffect::Paralysis, "Frozen Stiff",
            "Your limbs lock. The world keeps moving and you cannot.")
            .lasting(1)
            .with_status(&["Stunned"]),
        PanicTableEntry::new(2, PanicEffect::Outcry, "Involuntary Outcry",
            "A raw sound escapes you. Everything nearby now knows where you are."),
        PanicTableEntry::new(3, PanicEffect::Flight, "Blind Flight",
            "Every instinct screams to get away from the source.")
            .lasting(1)
            .forcing(ForcedAction::FleeFromSource),
        PanicTableEntry::new(4, PanicEffect::Collapse, "Curled Up",
            "You drop to the ground and make yourself small.")
            .lasting(1)
            .with_status(&["Prone"]),
        PanicTableEntry::new(5, PanicEffect::Blackout, "Blackout",
            "The light goes out behind your eyes.")
            .lasting(2)
            .with_status(&["Unconscious"]),
        PanicTableEntry::new(6, PanicEffect::Denial, "Denial",
            "Your mind refuses to see what is in front of you.")
            .lasting(2),
        PanicTableEntry::new(7, PanicEffect::Violence, "Lashing Out",
            "Fear turns to fury and you strike at whatever is closest.")
            .lasting(1)
            .forcing(ForcedAction::AttackNearest),
        PanicTableEntry::new(8, PanicEffect::Catatonia, "Shutdown",
            "You fold in on yourself, unresponsive to anything but pain.")
            .lasting(2)
            .with_status(&["Prone", "Stunned"])
            .with_self_damage(2),
        PanicTableEntry::new(9, PanicEffect::Dissociation, "Unmoored",
            "Your body moves without you. Intent and action come apart.")
            .lasting(1)
            .forcing(ForcedAction::RandomAction),
        PanicTableEntry::new(10, PanicEffect::NoEffect, "Steady Nerves",
            "Somehow, you hold together. For now."),
    ];
}

/// Result of one panic roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicResult {
    pub die_roll: u32,
    pub effect: PanicEffect,
    pub effect_name: String,
    pub description: String,
    pub duration_turns: Option<u32>,
    pub self_damage: Option<u32>,
    pub status_effects: Vec<String>,
    pub forces_action: bool,
    pub forced_action_type: Option<ForcedAction>,
}

impl PanicResult {
    fn from_entry(roll: u32, entry: &PanicTableEntry) -> Self {
        Self {
            die_roll: roll,
            effect: entry.effect,
            effect_name: entry.name.clone(),
            description: entry.description.clone(),
            duration_turns: entry.duration_turns,
            self_damage: entry.self_damage,
            status_effects: entry.status_effects.clone(),
            forces_action: entry.forced_action.is_some(),
            forced_action_type: entry.forced_action,
        }
    }
}

/// A validated panic table covering every face of a d10.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicTable {
    entries: Vec<PanicTableEntry>,
}

impl Default for PanicTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES.clone(),
        }
    }
}

impl PanicTable {
    /// Build a table, checking every face is mapped exactly once.
    pub fn from_entries(entries: Vec<PanicTableEntry>) -> Result<Self, PanicTableError> {
        let sides = PANIC_DIE.sides();
        for entry in &entries {
            if entry.min_roll < 1 || entry.max_roll > sides || entry.min_roll > entry.max_roll {
                return Err(PanicTableError::InvalidRange {
                    name: entry.name.clone(),
                    min: entry.min_roll,
                    max: entry.max_roll,
                });
            }
        }
        for roll in 1..=sides {
            match entries.iter().filter(|e| e.covers(roll)).count() {
                0 => return Err(PanicTableError::Unmapped { roll }),
                1 => {}
                _ => return Err(PanicTableError::Overlap { roll }),
            }
        }
        Ok(Self { entries })
    }

    pub fn from_json_str(json: &str) -> Result<Self, PanicTableError> {
        let entries: Vec<PanicTableEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, PanicTableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn entries(&self) -> &[PanicTableEntry] {
        &self.entries
    }

    /// Map a die face to its effect.
    pub fn resolve(&self, roll: u32) -> Result<PanicResult, PanicTableError> {
        self.entries
            .iter()
            .find(|e| e.covers(roll))
            .map(|entry| PanicResult::from_entry(roll, entry))
            .ok_or(PanicTableError::Unmapped { roll })
    }

    /// Roll one unmodified d10 and resolve it.
    pub fn roll<D: DiceRoller + ?Sized>(&self, dice: &mut D) -> Result<PanicResult, PanicTableError> {
        let roll = dice.roll(PANIC_DIE, 1, 0);
        let face = roll.rolls.first().copied().unwrap_or_default();
        self.resolve(face)
    }
}

/// Applies status effects to characters.
pub trait StatusEffectService {
    fn apply_effect(&mut self, character_id: CharacterId, effect_id: &str, duration_turns: u32);
}

impl<T: StatusEffectService + ?Sized> StatusEffectService for &mut T {
    fn apply_effect(&mut self, character_id: CharacterId, effect_id: &str, duration_turns: u32) {
        (**self).apply_effect(character_id, effect_id, duration_turns)
    }
}

/// Status-effect sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatusEffects;

impl StatusEffectService for NoStatusEffects {
    fn apply_effect(&mut self, _: CharacterId, _: &str, _: u32) {}
}

/// Push a panic result's status effects to the effect service.
///
/// Returns the number of effects applied. Calling this twice for one roll
/// applies the effects twice.
pub fn apply_panic_effect<E: StatusEffectService + ?Sized>(
    effects: &mut E,
    character_id: CharacterId,
    result: &PanicResult,
) -> usize {
    let Some(duration) = result.duration_turns else {
        return 0;
    };
    for effect_id in &result.status_effects {
        effects.apply_effect(character_id, effect_id, duration);
    }
    result.status_effects.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingEffects, ScriptedDice};

    #[test]
    fn test_default_table_is_total() {
        let table = PanicTable::default();
        assert!(PanicTable::from_entries(table.entries().to_vec()).is_ok());
        for roll in 1..=10 {
            assert!(table.resolve(roll).is_ok(), "roll {roll} unmapped");
        }
        assert!(matches!(
            table.resolve(11),
            Err(PanicTableError::Unmapped { roll: 11 })
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let table = PanicTable::default();
        for roll in 1..=10 {
            assert_eq!(table.resolve(roll).unwrap(), table.resolve(roll).unwrap());
        }
    }

    #[test]
    fn test_ten_is_no_effect() {
        let mut dice = ScriptedDice::new([10]);
        let result = PanicTable::default().roll(&mut dice).unwrap();
        assert_eq!(result.die_roll, 10);
        assert_eq!(result.effect, PanicEffect::NoEffect);
        assert!(!result.forces_action);
        assert!(result.status_effects.is_empty());
    }

    #[test]
    fn test_violence_forces_attack() {
        let result = PanicTable::default().resolve(7).unwrap();
        assert_eq!(result.effect, PanicEffect::Violence);
        assert!(result.forces_action);
        assert_eq!(result.forced_action_type, Some(ForcedAction::AttackNearest));
    }

    #[test]
    fn test_paralysis_stuns() {
        let result = PanicTable::default().resolve(1).unwrap();
        assert_eq!(result.effect, PanicEffect::Paralysis);
        assert_eq!(result.status_effects, vec!["Stunned".to_string()]);
        assert_eq!(result.duration_turns, Some(1));
    }

    #[test]
    fn test_rejects_gaps_and_overlaps() {
        let mut entries = PanicTable::default().entries().to_vec();
        entries.pop();
        assert!(matches!(
            PanicTable::from_entries(entries.clone()),
            Err(PanicTableError::Unmapped { roll: 10 })
        ));

        entries.push(PanicTableEntry::new(9, PanicEffect::NoEffect, "x", "y"));
        assert!(matches!(
            PanicTable::from_entries(entries),
            Err(PanicTableError::Overlap { .. })
        ));

        let bad = vec![PanicTableEntry {
            min_roll: 5,
            max_roll: 2,
            ..PanicTableEntry::new(1, PanicEffect::NoEffect, "bad", "range")
        }];
        assert!(matches!(
            PanicTable::from_entries(bad),
            Err(PanicTableError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_load_ranged_table_from_json() {
        let json = r#"[
            {"min_roll": 1, "max_roll": 5, "effect": "Paralysis", "name": "Freeze",
             "description": "Locked up.", "duration_turns": 1, "status_effects": ["Stunned"]},
            {"min_roll": 6, "max_roll": 10, "effect": "NoEffect", "name": "Fine",
             "description": "Nothing happens."}
        ]"#;
        let table = PanicTable::from_json_str(json).unwrap();
        assert_eq!(table.resolve(3).unwrap().effect, PanicEffect::Paralysis);
        assert_eq!(table.resolve(6).unwrap().effect, PanicEffect::NoEffect);
    }

    #[test]
    fn test_unknown_effect_in_json_is_an_error() {
        let json = r#"[{"min_roll": 1, "max_roll": 10, "effect": "Sneezing",
                        "name": "x", "description": "y"}]"#;
        assert!(matches!(
            PanicTable::from_json_str(json),
            Err(PanicTableError::Json(_))
        ));
    }

    #[test]
    fn test_apply_effect_calls_service_per_status() {
        let id = CharacterId::new();
        let mut effects = RecordingEffects::default();
        let result = PanicTable::default().resolve(8).unwrap();
        let applied = apply_panic_effect(&mut effects, id, &result);
        assert_eq!(applied, 2);
        assert_eq!(
            effects.applied,
            vec![(id, "Prone".to_string(), 2), (id, "Stunned".to_string(), 2)]
        );
    }

    #[test]
    fn test_no_effect_makes_no_calls() {
        let mut effects = RecordingEffects::default();
        let result = PanicTable::default().resolve(10).unwrap();
        assert_eq!(apply_panic_effect(&mut effects, CharacterId::new(), &result), 0);
        assert!(effects.applied.is_empty());
    }
}
