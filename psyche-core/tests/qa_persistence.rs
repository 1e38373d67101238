//! QA tests for the SQLite store on a real database file.
//!
//! Run with: `cargo test -p psyche-core --test qa_persistence`

use psyche_core::testing::{assert_history_consistent, ScriptedDice};
use psyche_core::{
    CharacterId, CorruptionSource, EngineConfig, NoStatusEffects, PsycheEngine, PsycheStore,
    RestType, SharedEngine, SqliteStore, Stage, StressSource,
};
use tempfile::TempDir;

fn engine_at(dir: &TempDir) -> PsycheEngine<SqliteStore, ScriptedDice, NoStatusEffects> {
    let store = SqliteStore::open(dir.path().join("psyche.db")).unwrap();
    PsycheEngine::new(store, ScriptedDice::default(), NoStatusEffects, EngineConfig::new())
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_meters_and_history_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let id = CharacterId::new();
    {
        let mut engine = engine_at(&dir);
        engine.create_character(id).unwrap();
        engine.apply_stress(id, 30, StressSource::Combat, None).unwrap();
        engine.apply_stress(id, 35, StressSource::Exploration, None).unwrap();
        engine.recover_stress(id, RestType::Short, 2).unwrap();
        engine.add_corruption(id, 55, CorruptionSource::Ritual).unwrap();
        engine.acquire_trauma(id, "night-terrors", "Horror").unwrap();
        engine.acquire_trauma(id, "night-terrors", "Horror").unwrap();
    }

    let engine = engine_at(&dir);
    let tracker = engine.tracker(id).unwrap();
    assert_eq!(tracker.stress().value(), 61);
    assert_eq!(tracker.stress().stage(), Stage::SevereInstability);
    assert_eq!(tracker.corruption().value(), 55);
    assert!(tracker.flags().crossed_50);
    assert!(!tracker.flags().crossed_75);

    let sources: Vec<StressSource> = engine
        .stress_history(id)
        .unwrap()
        .into_iter()
        .map(|e| e.source)
        .collect();
    assert_eq!(
        sources,
        vec![StressSource::Combat, StressSource::Exploration, StressSource::ShortRest]
    );
    assert_history_consistent(engine.store(), id);

    let traumas = engine.traumas(id).unwrap();
    assert_eq!(traumas.len(), 1);
    assert_eq!(traumas[0].stack_count, 2);
}

#[test]
fn test_transfer_persists_both_sides() {
    let dir = TempDir::new().unwrap();
    let donor = CharacterId::new();
    let recipient = CharacterId::new();
    {
        let mut engine = engine_at(&dir);
        engine.create_character(donor).unwrap();
        engine.create_character(recipient).unwrap();
        engine
            .add_corruption(donor, 40, CorruptionSource::Artifact)
            .unwrap();
        engine.transfer_corruption(donor, recipient, 15).unwrap();
    }

    let engine = engine_at(&dir);
    assert_eq!(engine.tracker(donor).unwrap().corruption().value(), 25);
    assert_eq!(engine.tracker(recipient).unwrap().corruption().value(), 15);

    let donor_history = engine.corruption_history(donor).unwrap();
    let last = donor_history.last().unwrap();
    assert!(last.is_transfer);
    assert_eq!(last.transfer_target_id, Some(recipient));
    assert_eq!(last.final_amount, -15);
    assert_history_consistent(engine.store(), donor);
    assert_history_consistent(engine.store(), recipient);
}

#[test]
fn test_deleted_character_keeps_history() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_at(&dir);
    let id = CharacterId::new();
    engine.create_character(id).unwrap();
    engine.apply_stress(id, 12, StressSource::Narrative, None).unwrap();
    engine.delete_character(id).unwrap();

    assert!(engine.tracker(id).is_err());
    assert_eq!(engine.store().stress_history(id).unwrap().len(), 1);
}

// =============================================================================
// Concurrent access
// =============================================================================

#[tokio::test]
async fn test_shared_engine_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let shared = SharedEngine::new(engine_at(&dir));
    let id = CharacterId::new();
    shared.create_character(id).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            shared
                .apply_stress(id, 7, StressSource::Environmental, None)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = shared.get_state(id).await.unwrap();
    assert_eq!(state.current_value, 70);
    assert!(state.requires_panic_check);
    shared
        .with_engine(|e| assert_history_consistent(e.store(), id))
        .await;
}
