//! Stage transitions and stage-derived guidance.

use crate::meter::{clamp_meter, Stage};
use serde::{Deserialize, Serialize};

const SEVERE_FLOOR: i32 = 60;
const TERMINAL_FLOOR: i32 = 80;

/// How a meter change moved between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub previous_value: i32,
    pub new_value: i32,
    pub previous_stage: Stage,
    pub new_stage: Stage,
    pub stage_changed: bool,
    pub entered_severe: bool,
    pub entered_terminal: bool,
    pub is_critical_transition: bool,
}

impl StageTransition {
    pub fn detect(previous: i32, new: i32) -> Self {
        let previous = clamp_meter(previous);
        let new = clamp_meter(new);
        let previous_stage = Stage::of(previous);
        let new_stage = Stage::of(new);
        let entered_severe = new >= SEVERE_FLOOR && previous < SEVERE_FLOOR;
        let entered_terminal = new >= TERMINAL_FLOOR && previous < TERMINAL_FLOOR;

        Self {
            previous_value: previous,
            new_value: new,
            previous_stage,
            new_stage,
            stage_changed: previous_stage != new_stage,
            entered_severe,
            entered_terminal,
            is_critical_transition: entered_severe || entered_terminal,
        }
    }

    pub fn worsened(&self) -> bool {
        self.new_stage > self.previous_stage
    }
}

/// Snapshot of a meter as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    pub stage: Stage,
    pub current_value: i32,
    pub requires_panic_check: bool,
    pub is_terminal: bool,
}

impl StageState {
    pub fn for_value(value: i32) -> Self {
        let value = clamp_meter(value);
        let stage = Stage::of(value);
        Self {
            stage,
            current_value: value,
            requires_panic_check: stage == Stage::SevereInstability,
            is_terminal: stage == Stage::Terminal,
        }
    }
}

/// Whether a character at this stage can still be brought back by normal play.
pub fn is_recoverable(stage: Stage) -> bool {
    !matches!(stage, Stage::SevereInstability | Stage::Terminal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

/// Stage-specific guidance for bringing a character back down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryProtocol {
    pub stage: Stage,
    pub protocol_name: &'static str,
    pub urgency: Urgency,
    pub guidance: &'static str,
}

impl RecoveryProtocol {
    pub fn for_stage(stage: Stage) -> Self {
        let (protocol_name, urgency, guidance) = match stage {
            Stage::None => (
                "Routine Care",
                Urgency::None,
                "No intervention needed. Normal rest keeps the mind steady.",
            ),
            Stage::EarlyWarning => (
                "Grounding",
                Urgency::Low,
                "Take a short rest and step away from the source of strain.",
            ),
            Stage::ModerateInstability => (
                "Structured Decompression",
                Urgency::Moderate,
                "A long rest is advised before the next confrontation.",
            ),
            Stage::SevereInstability => (
                "Sanctuary Containment",
                Urgency::High,
                "Withdraw to a sanctuary. Panic may strike at any moment.",
            ),
            Stage::Terminal => (
                "Emergency Extraction",
                Urgency::Critical,
                "The character is breaking. Remove them from play immediately.",
            ),
        };
        Self {
            stage,
            protocol_name,
            urgency,
            guidance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entering_severe() {
        let t = StageTransition::detect(55, 65);
        assert!(t.stage_changed);
        assert_eq!(t.previous_stage, Stage::ModerateInstability);
        assert_eq!(t.new_stage, Stage::SevereInstability);
        assert!(t.entered_severe);
        assert!(!t.entered_terminal);
        assert!(t.is_critical_transition);
    }

    #[test]
    fn test_entering_terminal() {
        let t = StageTransition::detect(75, 85);
        assert!(t.entered_terminal);
        assert!(!t.entered_severe);
        assert!(t.is_critical_transition);
    }

    #[test]
    fn test_jump_over_both_boundaries() {
        let t = StageTransition::detect(10, 95);
        assert!(t.entered_severe);
        assert!(t.entered_terminal);
        assert!(t.worsened());
    }

    #[test]
    fn test_other_boundaries_are_not_critical() {
        assert!(!StageTransition::detect(19, 20).is_critical_transition);
        assert!(!StageTransition::detect(39, 40).is_critical_transition);
        assert!(!StageTransition::detect(65, 65).is_critical_transition);
        assert!(!StageTransition::detect(85, 55).is_critical_transition);
        let t = StageTransition::detect(39, 40);
        assert!(t.stage_changed);
    }

    #[test]
    fn test_state_for_value() {
        let state = StageState::for_value(65);
        assert_eq!(state.stage, Stage::SevereInstability);
        assert!(state.requires_panic_check);
        assert!(!state.is_terminal);

        let state = StageState::for_value(80);
        assert!(!state.requires_panic_check);
        assert!(state.is_terminal);
    }

    #[test]
    fn test_recoverable_stages() {
        assert!(is_recoverable(Stage::None));
        assert!(is_recoverable(Stage::EarlyWarning));
        assert!(is_recoverable(Stage::ModerateInstability));
        assert!(!is_recoverable(Stage::SevereInstability));
        assert!(!is_recoverable(Stage::Terminal));
    }

    #[test]
    fn test_protocol_urgency_rises_with_stage() {
        let urgencies: Vec<_> = Stage::ALL
            .iter()
            .map(|s| RecoveryProtocol::for_stage(*s).urgency)
            .collect();
        let mut sorted = urgencies.clone();
        sorted.sort();
        assert_eq!(urgencies, sorted);
        assert_eq!(
            RecoveryProtocol::for_stage(Stage::Terminal).urgency,
            Urgency::Critical
        );
    }
}
