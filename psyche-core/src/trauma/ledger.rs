//! Trauma acquisition and stacking.

use super::definition::TraumaDefinition;
use crate::meter::CharacterId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RETIREMENT_MARKER: &str = "[RETIREMENT REQUIRED]";
pub const CRITICAL_RETIREMENT_MARKER: &str = "[CRITICAL - RETIREMENT REQUIRED]";

/// A trauma held by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterTrauma {
    pub character_id: CharacterId,
    pub trauma_id: String,
    pub source: String,
    pub stack_count: u32,
    pub acquired_at: DateTime<Utc>,
}

impl CharacterTrauma {
    pub fn new(character_id: CharacterId, trauma_id: &str, source: &str) -> Self {
        Self {
            character_id,
            trauma_id: trauma_id.to_lowercase(),
            source: source.to_string(),
            stack_count: 1,
            acquired_at: Utc::now(),
        }
    }
}

/// Outcome of trying to give a character a trauma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaAcquisitionResult {
    pub success: bool,
    pub trauma_id: String,
    pub trauma_name: String,
    pub source: String,
    pub is_new_trauma: bool,
    pub new_stack_count: u32,
    pub triggers_retirement_check: bool,
    pub message: String,
}

impl TraumaAcquisitionResult {
    /// First occurrence of a trauma.
    pub fn create_new(
        trauma_id: &str,
        trauma_name: &str,
        source: &str,
        triggers_retirement_check: bool,
    ) -> Self {
        let mut message = format!("You have acquired {trauma_name}");
        if triggers_retirement_check {
            message.push(' ');
            message.push_str(RETIREMENT_MARKER);
        }
        Self {
            success: true,
            trauma_id: trauma_id.to_string(),
            trauma_name: trauma_name.to_string(),
            source: source.to_string(),
            is_new_trauma: true,
            new_stack_count: 1,
            triggers_retirement_check,
            message,
        }
    }

    /// A stackable trauma already held got worse.
    pub fn create_stacked(
        trauma_id: &str,
        trauma_name: &str,
        source: &str,
        new_stack_count: u32,
        triggers_retirement_check: bool,
    ) -> Self {
        let mut message = format!("{trauma_name} has worsened (x{new_stack_count})");
        if triggers_retirement_check {
            message.push(' ');
            message.push_str(CRITICAL_RETIREMENT_MARKER);
        }
        Self {
            success: true,
            trauma_id: trauma_id.to_string(),
            trauma_name: trauma_name.to_string(),
            source: source.to_string(),
            is_new_trauma: false,
            new_stack_count,
            triggers_retirement_check,
            message,
        }
    }

    /// A non-stackable trauma that is already held.
    pub fn create_failure(trauma_id: &str, trauma_name: &str, source: &str) -> Self {
        Self {
            success: false,
            trauma_id: trauma_id.to_string(),
            trauma_name: trauma_name.to_string(),
            source: source.to_string(),
            is_new_trauma: false,
            new_stack_count: 0,
            triggers_retirement_check: false,
            message: format!("{trauma_name} is already present and cannot stack"),
        }
    }
}

/// What acquiring a trauma does to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub result: TraumaAcquisitionResult,
    /// The row to store, if anything changed.
    pub updated: Option<CharacterTrauma>,
}

/// Decide how `definition` lands on a character who currently holds `held`.
pub fn acquire(
    character_id: CharacterId,
    definition: &TraumaDefinition,
    held: Option<&CharacterTrauma>,
    source: &str,
) -> Acquisition {
    match held {
        None => {
            let triggers = definition.retirement.is_met(1);
            Acquisition {
                result: TraumaAcquisitionResult::create_new(
                    &definition.id,
                    &definition.name,
                    source,
                    triggers,
                ),
                updated: Some(CharacterTrauma::new(character_id, &definition.id, source)),
            }
        }
        Some(existing) if definition.stackable => {
            let mut trauma = existing.clone();
            trauma.stack_count += 1;
            let triggers = definition.retirement.is_met(trauma.stack_count);
            Acquisition {
                result: TraumaAcquisitionResult::create_stacked(
                    &definition.id,
                    &definition.name,
                    source,
                    trauma.stack_count,
                    triggers,
                ),
                updated: Some(trauma),
            }
        }
        Some(_) => Acquisition {
            result: TraumaAcquisitionResult::create_failure(
                &definition.id,
                &definition.name,
                source,
            ),
            updated: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trauma::definition::TraumaCatalog;

    #[test]
    fn test_create_new_message() {
        let result = TraumaAcquisitionResult::create_new("night-terrors", "Night Terrors", "Combat", false);
        assert_eq!(result.message, "You have acquired Night Terrors");
        assert_eq!(result.new_stack_count, 1);
        assert!(result.is_new_trauma);

        let result = TraumaAcquisitionResult::create_new("hollow-self", "Hollow Self", "Ritual", true);
        assert!(result.message.contains(RETIREMENT_MARKER));
    }

    #[test]
    fn test_create_stacked_message_has_count_and_critical_marker() {
        let result = TraumaAcquisitionResult::create_stacked(
            "reality-doubt",
            "Reality Doubt",
            "WitnessingHorror",
            5,
            true,
        );
        assert!(result.message.contains("(x5)"));
        assert!(result.message.contains(CRITICAL_RETIREMENT_MARKER));
        assert!(result.success);
        assert!(!result.is_new_trauma);
    }

    #[test]
    fn test_create_failure() {
        let result = TraumaAcquisitionResult::create_failure("survivors-guilt", "Survivor's Guilt", "Narrative");
        assert!(!result.success);
        assert!(result.message.contains("cannot stack"));
    }

    #[test]
    fn test_acquire_flow() {
        let catalog = TraumaCatalog::default();
        let id = CharacterId::new();
        let def = catalog.get("reality-doubt").unwrap();

        let first = acquire(id, def, None, "Horror");
        assert!(first.result.is_new_trauma);
        assert!(!first.result.triggers_retirement_check);
        let mut held = first.updated.unwrap();

        for expected in 2..=5 {
            let next = acquire(id, def, Some(&held), "Horror");
            assert_eq!(next.result.new_stack_count, expected);
            assert_eq!(next.result.triggers_retirement_check, expected >= 5);
            held = next.updated.unwrap();
        }
    }

    #[test]
    fn test_acquire_non_stackable_twice() {
        let catalog = TraumaCatalog::default();
        let id = CharacterId::new();
        let def = catalog.get("survivors-guilt").unwrap();
        let held = acquire(id, def, None, "Loss").updated.unwrap();
        let again = acquire(id, def, Some(&held), "Loss");
        assert!(!again.result.success);
        assert!(again.updated.is_none());
    }

    #[test]
    fn test_on_acquisition_triggers_immediately() {
        let catalog = TraumaCatalog::default();
        let def = catalog.get("hollow-self").unwrap();
        let result = acquire(CharacterId::new(), def, None, "Ritual").result;
        assert!(result.triggers_retirement_check);
    }
}
