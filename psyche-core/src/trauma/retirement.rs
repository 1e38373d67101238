//! Retirement decisions from a character's held traumas.

use super::definition::{RetirementRule, TraumaCatalog};
use super::ledger::CharacterTrauma;
use crate::meter::CharacterId;
use serde::{Deserialize, Serialize};

/// Held traumas with stack counts above 1 needed before retirement is offered.
pub const OPTIONAL_RETIREMENT_STACKED: usize = 3;

pub const IMMEDIATE_REASON: &str = "Severe trauma forces immediate retirement";
pub const STACKING_REASON: &str = "Critical trauma stacking forces retirement";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementCheckResult {
    pub character_id: CharacterId,
    pub must_retire: bool,
    pub retirement_reason: Option<String>,
    pub traumas_causing_retirement: Vec<String>,
    pub total_retirement_traumas: usize,
    pub can_continue_with_permission: bool,
}

impl RetirementCheckResult {
    pub fn create_must_retire(
        character_id: CharacterId,
        reason: impl Into<String>,
        traumas: Vec<String>,
    ) -> Self {
        Self {
            character_id,
            must_retire: true,
            retirement_reason: Some(reason.into()),
            total_retirement_traumas: traumas.len(),
            traumas_causing_retirement: traumas,
            can_continue_with_permission: false,
        }
    }

    pub fn create_optional(character_id: CharacterId, traumas: Vec<String>) -> Self {
        Self {
            character_id,
            must_retire: false,
            retirement_reason: Some("Accumulated trauma makes retirement advisable".to_string()),
            total_retirement_traumas: traumas.len(),
            traumas_causing_retirement: traumas,
            can_continue_with_permission: true,
        }
    }

    pub fn create_no_retirement(character_id: CharacterId) -> Self {
        Self {
            character_id,
            must_retire: false,
            retirement_reason: None,
            traumas_causing_retirement: Vec::new(),
            total_retirement_traumas: 0,
            can_continue_with_permission: false,
        }
    }
}

/// Evaluate the retirement rules over everything a character holds.
///
/// Traumas missing from the catalog are skipped.
pub fn evaluate(
    character_id: CharacterId,
    held: &[CharacterTrauma],
    catalog: &TraumaCatalog,
) -> RetirementCheckResult {
    let mut immediate = Vec::new();
    let mut stacking = Vec::new();
    let mut stacked = Vec::new();

    for trauma in held {
        let Some(def) = catalog.get(&trauma.trauma_id) else {
            tracing::warn!(trauma_id = %trauma.trauma_id, "held trauma missing from catalog");
            continue;
        };
        if def.retirement.is_met(trauma.stack_count) {
            if def.retirement == RetirementRule::OnAcquisition {
                immediate.push(trauma.trauma_id.clone());
            } else {
                stacking.push(trauma.trauma_id.clone());
            }
        }
        if trauma.stack_count > 1 {
            stacked.push(trauma.trauma_id.clone());
        }
    }

    let reason = if !immediate.is_empty() {
        Some(IMMEDIATE_REASON)
    } else if !stacking.is_empty() {
        Some(STACKING_REASON)
    } else {
        None
    };

    if let Some(reason) = reason {
        immediate.extend(stacking);
        return RetirementCheckResult::create_must_retire(character_id, reason, immediate);
    }
    if stacked.len() >= OPTIONAL_RETIREMENT_STACKED {
        return RetirementCheckResult::create_optional(character_id, stacked);
    }
    RetirementCheckResult::create_no_retirement(character_id)
}
