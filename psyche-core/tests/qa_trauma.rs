//! QA tests for trauma acquisition, trauma checks and retirement.
//!
//! Run with: `cargo test -p psyche-core --test qa_trauma`

use psyche_core::engine::{EngineError, TRAUMA_FAIL_RESET, TRAUMA_PASS_RESET};
use psyche_core::testing::{
    assert_history_consistent, FailingStore, RecordingEffects, ScriptedDice, TestHarness,
};
use psyche_core::trauma::ledger::{CRITICAL_RETIREMENT_MARKER, RETIREMENT_MARKER};
use psyche_core::trauma::retirement::{IMMEDIATE_REASON, STACKING_REASON};
use psyche_core::trauma::TraumaCategory;
use psyche_core::{
    CharacterId, CorruptionSource, EngineConfig, PanicEffect, PanicTable, PsycheEngine,
    PsycheStore, RetirementRule, StoreError, StressSource, TraumaCatalog, TraumaCheckContext,
    TraumaCheckTrigger, TraumaDefinition,
};

const CATALOG_JSON: &str = include_str!("../content/trauma_catalog.json");
const PANIC_JSON: &str = include_str!("../content/panic_table.json");

fn content_config() -> EngineConfig {
    EngineConfig::new()
        .with_trauma_catalog(TraumaCatalog::from_json_str(CATALOG_JSON).unwrap())
        .with_panic_table(PanicTable::from_json_str(PANIC_JSON).unwrap())
}

// =============================================================================
// Acquisition and stacking
// =============================================================================

#[test]
fn test_stacking_to_retirement() {
    let mut harness = TestHarness::new();
    let id = harness.character;

    let first = harness.engine.acquire_trauma(id, "hypervigilance", "Ambush").unwrap();
    assert!(first.success && first.is_new_trauma);
    assert_eq!(first.message, "You have acquired Hypervigilance");

    let second = harness.engine.acquire_trauma(id, "hypervigilance", "Ambush").unwrap();
    assert_eq!(second.new_stack_count, 2);
    assert!(!second.triggers_retirement_check);
    assert!(second.message.contains("x2"));

    let third = harness.engine.acquire_trauma(id, "HYPERVIGILANCE", "Ambush").unwrap();
    assert_eq!(third.new_stack_count, 3);
    assert!(third.triggers_retirement_check);
    assert!(third.message.contains(CRITICAL_RETIREMENT_MARKER));

    let check = harness.engine.check_retirement(id).unwrap();
    assert!(check.must_retire);
    assert_eq!(check.retirement_reason.as_deref(), Some(STACKING_REASON));
    assert_eq!(check.traumas_causing_retirement, vec!["hypervigilance".to_string()]);
    assert!(!check.can_continue_with_permission);
}

#[test]
fn test_non_stackable_trauma_is_refused_twice() {
    let mut harness = TestHarness::new();
    let id = harness.character;
    harness.engine.acquire_trauma(id, "survivors-guilt", "Ally lost").unwrap();
    let again = harness.engine.acquire_trauma(id, "survivors-guilt", "Ally lost").unwrap();
    assert!(!again.success);
    assert!(again.message.contains("cannot stack"));

    let held = harness.engine.traumas(id).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].stack_count, 1);
}

#[test]
fn test_non_ascii_trauma_id_stacks() {
    let catalog = TraumaCatalog::from_definitions(vec![TraumaDefinition::new(
        "Ünruhe",
        "Unrest",
        TraumaCategory::Emotional,
        "A restlessness that will not leave.",
    )
    .stackable()])
    .unwrap();
    let config = EngineConfig::new().with_trauma_catalog(catalog);
    let mut harness = TestHarness::with_config(config, Vec::<u32>::new());
    let id = harness.character;

    harness.engine.acquire_trauma(id, "Ünruhe", "Storm").unwrap();
    let again = harness.engine.acquire_trauma(id, "ÜNRUHE", "Storm").unwrap();
    assert!(again.success);
    assert!(!again.is_new_trauma);
    assert_eq!(again.new_stack_count, 2);

    let held = harness.engine.traumas(id).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].stack_count, 2);
}

#[test]
fn test_immediate_retirement_trauma() {
    let mut harness = TestHarness::new();
    let id = harness.character;
    let result = harness.engine.acquire_trauma(id, "hollow-self", "The Rite").unwrap();
    assert!(result.triggers_retirement_check);
    assert!(result.message.ends_with(RETIREMENT_MARKER));

    let check = harness.engine.check_retirement(id).unwrap();
    assert!(check.must_retire);
    assert_eq!(check.retirement_reason.as_deref(), Some(IMMEDIATE_REASON));
    assert_eq!(check.total_retirement_traumas, 1);
}

#[test]
fn test_optional_retirement_after_three_stacked_traumas() {
    let mut harness = TestHarness::new();
    let id = harness.character;
    for trauma in ["night-terrors", "reality-doubt", "isolophobia"] {
        harness.engine.acquire_trauma(id, trauma, "Long campaign").unwrap();
        harness.engine.acquire_trauma(id, trauma, "Long campaign").unwrap();
    }
    let check = harness.engine.check_retirement(id).unwrap();
    assert!(!check.must_retire);
    assert!(check.can_continue_with_permission);
    assert_eq!(check.total_retirement_traumas, 3);
}

#[test]
fn test_clean_character_need_not_retire() {
    let harness = TestHarness::new();
    let check = harness.engine.check_retirement(harness.character).unwrap();
    assert!(!check.must_retire);
    assert!(!check.can_continue_with_permission);
    assert!(check.retirement_reason.is_none());
}

// =============================================================================
// Trauma checks
// =============================================================================

#[test]
fn test_failed_stress_overflow_check_acquires_trauma() {
    let mut harness = TestHarness::with_dice([1, 2, 3, 8]);
    let id = harness.character;
    harness.set_stress(100);

    let context = TraumaCheckContext::new(4)
        .with_trauma_on_failure("night-terrors")
        .with_resolve_penalty(1);
    let outcome = harness
        .engine
        .perform_trauma_check(id, TraumaCheckTrigger::StressOverflow, &context)
        .unwrap();

    assert!(!outcome.check.passed);
    assert_eq!(outcome.check.successes_needed, 3);
    assert_eq!(outcome.check.successes_achieved, 1);
    assert_eq!(outcome.check.resolve_penalty_applied, 1);
    let rendered = outcome.check.to_string();
    assert!(rendered.contains("FAILED -> night-terrors"), "{rendered}");

    let acquisition = outcome.acquisition.unwrap();
    assert!(acquisition.is_new_trauma);
    assert_eq!(acquisition.source, "StressOverflow");

    let reset = harness.engine.reset_after_trauma_check(id, false).unwrap();
    assert_eq!(reset.delta.new, TRAUMA_FAIL_RESET);
    assert_history_consistent(harness.engine.store(), id);
}

#[test]
fn test_trauma_check_counts_gross_successes() {
    let mut harness = TestHarness::with_dice([8, 9, 10, 1]);
    let id = harness.character;
    harness.set_stress(100);
    let context = TraumaCheckContext::new(4).with_trauma_on_failure("night-terrors");
    let outcome = harness
        .engine
        .perform_trauma_check(id, TraumaCheckTrigger::AllyDeath, &context)
        .unwrap();
    assert!(outcome.check.passed);
    assert!(outcome.acquisition.is_none());
    assert!(outcome.check.trauma_acquired.is_none());
    assert!(harness.engine.traumas(id).unwrap().is_empty());

    let reset = harness.engine.reset_after_trauma_check(id, true).unwrap();
    assert_eq!(reset.delta.new, TRAUMA_PASS_RESET);
}

#[test]
fn test_corruption_shrinks_trauma_check_pool() {
    let mut harness = TestHarness::new();
    let id = harness.character;
    harness.set_corruption(40);
    let context = TraumaCheckContext::new(4).with_modifier("Ally present", 1);
    let outcome = harness
        .engine
        .perform_trauma_check(id, TraumaCheckTrigger::ProlongedIsolation, &context)
        .unwrap();
    assert_eq!(outcome.check.dice_rolled, 3);
    assert_eq!(
        outcome.check.modifiers,
        vec!["Ally present +1".to_string(), "Corruption -2".to_string()]
    );
}

#[test]
fn test_unknown_failure_trauma_rolls_nothing() {
    let mut harness = TestHarness::with_dice([1, 1, 1]);
    let context = TraumaCheckContext::new(3).with_trauma_on_failure("made-up");
    let err = harness
        .engine
        .perform_trauma_check(harness.character, TraumaCheckTrigger::NearDeath, &context)
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownTrauma(ref t) if t == "made-up"));
    assert_eq!(harness.engine.dice_mut().remaining(), 3);
}

// =============================================================================
// Content files
// =============================================================================

#[test]
fn test_content_files_drive_the_engine() {
    let mut harness = TestHarness::with_config(content_config(), [3]);
    let id = harness.character;
    let catalog = &harness.engine.config().trauma_catalog;
    assert_eq!(catalog.len(), 6);
    assert_eq!(
        catalog.get("tremors").unwrap().retirement,
        RetirementRule::Never
    );

    harness.set_stress(62);
    let panic = harness.engine.roll_panic_table(id).unwrap();
    assert_eq!(panic.effect, PanicEffect::Flight);
    assert_eq!(panic.effect_name, "Headlong Retreat");
    assert!(panic.forces_action);

    let result = harness.engine.acquire_trauma(id, "broken-faith", "Desecration").unwrap();
    assert!(result.triggers_retirement_check);
    assert!(harness.engine.check_retirement(id).unwrap().must_retire);
}

// =============================================================================
// Atomicity under store failure
// =============================================================================

type FlakyEngine = PsycheEngine<FailingStore, ScriptedDice, RecordingEffects>;

fn flaky_engine() -> (FlakyEngine, CharacterId, CharacterId) {
    let mut engine = PsycheEngine::new(
        FailingStore::new(),
        ScriptedDice::default(),
        RecordingEffects::default(),
        EngineConfig::new(),
    );
    let a = CharacterId::new();
    let b = CharacterId::new();
    engine.create_character(a).unwrap();
    engine.create_character(b).unwrap();
    (engine, a, b)
}

#[test]
fn test_failed_stress_commit_changes_nothing() {
    let (mut engine, id, _) = flaky_engine();
    engine.apply_stress(id, 10, StressSource::Combat, None).unwrap();

    engine.store_mut().fail_now();
    let err = engine
        .apply_stress(id, 30, StressSource::Combat, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));

    assert_eq!(engine.tracker(id).unwrap().stress().value(), 10);
    assert_eq!(engine.stress_history(id).unwrap().len(), 1);
    assert_history_consistent(engine.store(), id);
}

#[test]
fn test_failed_transfer_changes_neither_side() {
    let (mut engine, donor, recipient) = flaky_engine();
    engine
        .add_corruption(donor, 40, CorruptionSource::Artifact)
        .unwrap();

    engine.store_mut().fail_now();
    assert!(engine.transfer_corruption(donor, recipient, 20).is_err());

    assert_eq!(engine.tracker(donor).unwrap().corruption().value(), 40);
    assert_eq!(engine.tracker(recipient).unwrap().corruption().value(), 0);
    assert!(engine.corruption_history(recipient).unwrap().is_empty());

    engine.store_mut().recover();
    let outcome = engine.transfer_corruption(donor, recipient, 20).unwrap();
    assert_eq!(outcome.transferred, 20);
    assert_history_consistent(engine.store(), donor);
    assert_history_consistent(engine.store(), recipient);
}

#[test]
fn test_failed_trauma_save_leaves_ledger_empty() {
    let (mut engine, id, _) = flaky_engine();
    engine.store_mut().fail_now();
    assert!(engine.acquire_trauma(id, "night-terrors", "Nightmare").is_err());
    assert!(engine.store().traumas(id).unwrap().is_empty());
}
