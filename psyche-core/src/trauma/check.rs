//! Dice-driven trauma resistance checks.

use crate::dice::{dice_expression, roll_pool, DiceRoller, DieType, PoolResult};
use crate::meter::CharacterId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Narrative causes of a trauma check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraumaCheckTrigger {
    StressOverflow,
    WitnessingHorror,
    AllyDeath,
    NearDeath,
    ForbiddenKnowledge,
    CorruptionSurge,
    ProlongedIsolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TriggerSeverity {
    Minor,
    Major,
    Extreme,
}

impl TriggerSeverity {
    pub fn successes_needed(&self) -> u32 {
        match self {
            TriggerSeverity::Minor => 1,
            TriggerSeverity::Major => 2,
            TriggerSeverity::Extreme => 3,
        }
    }
}

impl TraumaCheckTrigger {
    pub fn severity(&self) -> TriggerSeverity {
        match self {
            TraumaCheckTrigger::ProlongedIsolation => TriggerSeverity::Minor,
            TraumaCheckTrigger::WitnessingHorror
            | TraumaCheckTrigger::NearDeath
            | TraumaCheckTrigger::CorruptionSurge => TriggerSeverity::Major,
            TraumaCheckTrigger::StressOverflow
            | TraumaCheckTrigger::AllyDeath
            | TraumaCheckTrigger::ForbiddenKnowledge => TriggerSeverity::Extreme,
        }
    }

    pub fn successes_needed(&self) -> u32 {
        self.severity().successes_needed()
    }
}

impl fmt::Display for TraumaCheckTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A situational bonus or malus to the check pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolModifier {
    pub label: String,
    pub dice: i32,
}

impl PoolModifier {
    pub fn new(label: impl Into<String>, dice: i32) -> Self {
        Self {
            label: label.into(),
            dice,
        }
    }
}

impl fmt::Display for PoolModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:+}", self.label, self.dice)
    }
}

/// Caller-supplied inputs to a trauma check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaCheckContext {
    pub base_pool: i32,
    pub modifiers: Vec<PoolModifier>,
    /// Trauma gained if the check fails.
    pub trauma_on_failure: Option<String>,
    /// Resolve penalty applied alongside the trauma if the check fails.
    pub resolve_penalty_on_failure: Option<i32>,
}

impl TraumaCheckContext {
    pub fn new(base_pool: i32) -> Self {
        Self {
            base_pool,
            ..Default::default()
        }
    }

    pub fn with_modifier(mut self, label: impl Into<String>, dice: i32) -> Self {
        self.modifiers.push(PoolModifier::new(label, dice));
        self
    }

    pub fn with_trauma_on_failure(mut self, trauma_id: impl Into<String>) -> Self {
        self.trauma_on_failure = Some(trauma_id.into());
        self
    }

    pub fn with_resolve_penalty(mut self, penalty: i32) -> Self {
        self.resolve_penalty_on_failure = Some(penalty);
        self
    }

    /// Pool after modifiers and the corruption penalty, at least 1.
    pub fn pool_size(&self, corruption_dice_penalty: i32) -> i32 {
        let modifiers = self
            .modifiers
            .iter()
            .fold(0_i32, |acc, m| acc.saturating_add(m.dice));
        self.base_pool
            .saturating_add(modifiers)
            .saturating_sub(corruption_dice_penalty)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaCheckResult {
    pub character_id: CharacterId,
    pub trigger: TraumaCheckTrigger,
    pub dice_rolled: u32,
    pub successes_needed: u32,
    pub successes_achieved: u32,
    pub passed: bool,
    pub trauma_acquired: Option<String>,
    pub modifiers: Vec<String>,
    pub resolve_penalty_applied: i32,
    pub pool: PoolResult,
}

impl TraumaCheckResult {
    pub fn dice_expression(&self) -> String {
        dice_expression(self.dice_rolled, DieType::D10, 0)
    }
}

impl fmt::Display for TraumaCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trauma check [{}] {}: {}/{} {}",
            self.trigger,
            self.dice_expression(),
            self.successes_achieved,
            self.successes_needed,
            if self.passed { "PASSED" } else { "FAILED" }
        )?;
        if !self.passed {
            if let Some(trauma) = &self.trauma_acquired {
                write!(f, " -> {trauma}")?;
            }
            if self.resolve_penalty_applied != 0 {
                write!(f, " (resolve -{})", self.resolve_penalty_applied)?;
            }
        }
        Ok(())
    }
}

/// Roll a trauma check. Successes are counted gross: botches do not cancel
/// them here.
pub fn roll_trauma_check<D: DiceRoller + ?Sized>(
    dice: &mut D,
    character_id: CharacterId,
    trigger: TraumaCheckTrigger,
    context: &TraumaCheckContext,
    corruption_dice_penalty: i32,
) -> TraumaCheckResult {
    let pool_size = context.pool_size(corruption_dice_penalty);
    let pool = roll_pool(dice, pool_size);
    let successes_needed = trigger.successes_needed();
    let passed = pool.successes >= successes_needed;

    let mut modifiers: Vec<String> = context.modifiers.iter().map(|m| m.to_string()).collect();
    if corruption_dice_penalty > 0 {
        modifiers.push(format!("Corruption -{corruption_dice_penalty}"));
    }

    let (trauma_acquired, resolve_penalty_applied) = if passed {
        (None, 0)
    } else {
        (
            context.trauma_on_failure.clone(),
            context.resolve_penalty_on_failure.unwrap_or(0),
        )
    };

    TraumaCheckResult {
        character_id,
        trigger,
        dice_rolled: pool.pool_size(),
        successes_needed,
        successes_achieved: pool.successes,
        passed,
        trauma_acquired,
        modifiers,
        resolve_penalty_applied,
        pool,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDice;

    #[test]
    fn test_pool_size_includes_modifiers_and_penalty() {
        let ctx = TraumaCheckContext::new(4)
            .with_modifier("Ally nearby", 1)
            .with_modifier("Exhausted", -1);
        assert_eq!(ctx.pool_size(0), 4);
        assert_eq!(ctx.pool_size(2), 2);
        assert_eq!(ctx.pool_size(10), 1);
    }

    #[test]
    fn test_passed_check() {
        let mut dice = ScriptedDice::new([8, 9, 2]);
        let ctx = TraumaCheckContext::new(3).with_trauma_on_failure("reality-doubt");
        let result = roll_trauma_check(
            &mut dice,
            CharacterId::new(),
            TraumaCheckTrigger::WitnessingHorror,
            &ctx,
            0,
        );
        assert!(result.passed);
        assert_eq!(result.successes_needed, 2);
        assert_eq!(result.trauma_acquired, None);
        assert_eq!(result.to_string(), "Trauma check [WitnessingHorror] 3d10: 2/2 PASSED");
    }

    #[test]
    fn test_failed_check_log_line() {
        let mut dice = ScriptedDice::new([8, 3]);
        let ctx = TraumaCheckContext::new(3)
            .with_trauma_on_failure("night-terrors")
            .with_resolve_penalty(1);
        let result = roll_trauma_check(
            &mut dice,
            CharacterId::new(),
            TraumaCheckTrigger::AllyDeath,
            &ctx,
            1,
        );
        assert!(!result.passed);
        assert_eq!(result.dice_rolled, 2);
        assert_eq!(result.trauma_acquired.as_deref(), Some("night-terrors"));
        assert_eq!(result.modifiers, vec!["Corruption -1".to_string()]);
        assert_eq!(
            result.to_string(),
            "Trauma check [AllyDeath] 2d10: 1/3 FAILED -> night-terrors (resolve -1)"
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(
            TraumaCheckTrigger::StressOverflow.successes_needed()
                > TraumaCheckTrigger::ProlongedIsolation.successes_needed()
        );
    }
}
