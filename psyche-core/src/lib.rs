//! Psychological deterioration engine for tabletop-style character play.
//!
//! This crate provides:
//! - Stress and corruption meters with five severity stages
//! - Success-counting d10 pools and multi-round extended checks
//! - A panic table for characters in severe instability
//! - Trauma acquisition, stacking and retirement decisions
//! - An append-only audit history committed atomically with every meter change
//!
//! # Quick Start
//!
//! ```
//! use psyche_core::{
//!     CharacterId, EngineConfig, MemoryStore, NoStatusEffects, PsycheEngine, RngDice, Stage,
//!     StressSource,
//! };
//!
//! let mut engine = PsycheEngine::new(
//!     MemoryStore::new(),
//!     RngDice::seeded(7),
//!     NoStatusEffects,
//!     EngineConfig::new(),
//! );
//! let hero = CharacterId::new();
//! engine.create_character(hero)?;
//!
//! engine.apply_stress(hero, 65, StressSource::Combat, None)?;
//! let state = engine.get_state(hero)?;
//! assert_eq!(state.stage, Stage::SevereInstability);
//!
//! if state.requires_panic_check {
//!     let panic = engine.roll_panic_table(hero)?;
//!     engine.apply_panic_effect(hero, &panic);
//! }
//! # Ok::<(), psyche_core::EngineError>(())
//! ```

pub mod dice;
pub mod engine;
pub mod extended;
pub mod history;
pub mod meter;
pub mod panic;
pub mod persist;
pub mod shared;
pub mod store;
pub mod testing;
pub mod transition;
pub mod trauma;

// Primary public API
pub use dice::{roll_pool, DiceRoller, DieType, PoolResult, RngDice, RollResult};
pub use engine::{
    CorruptionOutcome, EngineConfig, EngineError, PsycheEngine, RestType, StressOutcome,
    StressResistance, TerminalCorruptionOutcome, TransferOutcome, TraumaCheckOutcome,
};
pub use extended::{ExtendedCheck, ExtendedCheckError, ExtendedCheckStatus, FailureReason};
pub use history::{CorruptionHistoryEntry, CorruptionSource, StressHistoryEntry, StressSource};
pub use meter::{
    CharacterId, CorruptionPenalties, CorruptionThreshold, MeterKind, MeterState, PsycheTracker,
    Stage, ThresholdFlags,
};
pub use panic::{
    ForcedAction, NoStatusEffects, PanicEffect, PanicResult, PanicTable, PanicTableError,
    StatusEffectService,
};
pub use persist::{PersistError, SqliteStore};
pub use shared::SharedEngine;
pub use store::{MemoryStore, PsycheStore, StoreError};
pub use testing::{FailingStore, RecordingEffects, ScriptedDice, TestHarness};
pub use transition::{RecoveryProtocol, StageState, StageTransition, Urgency};
pub use trauma::{
    CatalogError, RetirementCheckResult, RetirementRule, TraumaAcquisitionResult, TraumaCatalog,
    TraumaCheckContext, TraumaCheckResult, TraumaCheckTrigger, TraumaDefinition,
};
