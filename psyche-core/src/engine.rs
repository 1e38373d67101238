//! PsycheEngine - the primary public API for stress, corruption and trauma.
//!
//! The engine owns a [`PsycheStore`], a [`DiceRoller`] and a
//! [`StatusEffectService`]. Every mutation reads the authoritative tracker
//! from the store, applies the change, and commits the new meter value with
//! its history entry in one store call.

use crate::dice::{roll_pool, DiceRoller, PoolResult};
use crate::history::{CorruptionHistoryEntry, CorruptionSource, StressHistoryEntry, StressSource};
use crate::meter::{
    reduce_stress, resistance_reduction_percent, CharacterId, CorruptionPenalties, MeterDelta,
    MeterKind, PsycheTracker, Stage, METER_MAX,
};
use crate::panic::{self, PanicResult, PanicTable, PanicTableError, StatusEffectService};
use crate::store::{PsycheStore, StoreError};
use crate::transition::{self, RecoveryProtocol, StageState, StageTransition};
use crate::trauma::{
    ledger, retirement, roll_trauma_check, CharacterTrauma, RetirementCheckResult, TraumaCatalog,
    TraumaAcquisitionResult, TraumaCheckContext, TraumaCheckResult, TraumaCheckTrigger,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stress a character is left at after passing a trauma check.
pub const TRAUMA_PASS_RESET: i32 = 75;
/// Stress a character is left at after failing a trauma check.
pub const TRAUMA_FAIL_RESET: i32 = 50;
/// Stress recovered at a milestone.
pub const MILESTONE_RECOVERY: i32 = 25;
/// Successes needed to survive terminal corruption.
pub const TERMINAL_SURVIVAL_SUCCESSES: i32 = 3;
/// Corruption left after surviving terminal corruption.
pub const TERMINAL_SURVIVAL_VALUE: i32 = 99;

/// Errors from PsycheEngine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Operation requires stage {required}, but the character is at {actual}")]
    WrongStage { required: Stage, actual: Stage },

    #[error("Amount must not be negative (got {0})")]
    NegativeAmount(i32),

    #[error("Unknown trauma: {0}")]
    UnknownTrauma(String),

    #[error("Corruption is {0}; terminal corruption can only be resolved at 100")]
    NotTerminalCorruption(i32),

    #[error("Cannot transfer corruption from a character to itself")]
    SelfTransfer,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Panic table error: {0}")]
    PanicTable(#[from] PanicTableError),
}

/// Content the engine resolves against.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Table consulted by panic rolls.
    pub panic_table: PanicTable,

    /// Traumas that can be acquired.
    pub trauma_catalog: TraumaCatalog,
}

impl EngineConfig {
    /// Config with the built-in panic table and trauma catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_panic_table(mut self, table: PanicTable) -> Self {
        self.panic_table = table;
        self
    }

    pub fn with_trauma_catalog(mut self, catalog: TraumaCatalog) -> Self {
        self.trauma_catalog = catalog;
        self
    }
}

/// A resistance roll against incoming stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressResistance {
    pub dice_pool: i32,
    pub dc: u32,
}

/// Kinds of rest that recover stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestType {
    Short,
    Long,
    Sanctuary,
    Milestone,
}

impl RestType {
    pub fn source(&self) -> StressSource {
        match self {
            RestType::Short => StressSource::ShortRest,
            RestType::Long => StressSource::LongRest,
            RestType::Sanctuary => StressSource::Sanctuary,
            RestType::Milestone => StressSource::Milestone,
        }
    }

    /// Stress recovered for a character with the given will. Sanctuary
    /// clears the meter and is handled separately.
    pub fn recovery_amount(&self, will: i32) -> i32 {
        match self {
            RestType::Short => will.max(0).saturating_mul(2),
            RestType::Long => will.max(0).saturating_mul(5),
            RestType::Sanctuary => METER_MAX,
            RestType::Milestone => MILESTONE_RECOVERY,
        }
    }
}

/// Result of any stress mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressOutcome {
    pub delta: MeterDelta,
    pub transition: StageTransition,
    pub entry: StressHistoryEntry,
    pub resistance_roll: Option<PoolResult>,
    pub reduction_percent: i32,
    pub requires_panic_check: bool,
    pub trauma_check_triggered: bool,
}

/// Result of any corruption mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionOutcome {
    pub delta: MeterDelta,
    pub transition: StageTransition,
    pub entry: CorruptionHistoryEntry,
    pub penalties: CorruptionPenalties,
    pub is_terminal_corruption: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub requested: i32,
    pub transferred: i32,
    pub donor: CorruptionOutcome,
    pub recipient: CorruptionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalCorruptionOutcome {
    pub pool: PoolResult,
    pub successes_needed: i32,
    pub survived: bool,
    /// The character is gone for good.
    pub lost: bool,
    pub survival: Option<CorruptionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaCheckOutcome {
    pub check: TraumaCheckResult,
    pub acquisition: Option<TraumaAcquisitionResult>,
}

/// Stress, corruption, panic and trauma resolution for a set of characters.
pub struct PsycheEngine<S, D, E> {
    store: S,
    dice: D,
    effects: E,
    config: EngineConfig,
}

impl<S, D, E> PsycheEngine<S, D, E>
where
    S: PsycheStore,
    D: DiceRoller,
    E: StatusEffectService,
{
    pub fn new(store: S, dice: D, effects: E, config: EngineConfig) -> Self {
        Self {
            store,
            dice,
            effects,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn dice_mut(&mut self) -> &mut D {
        &mut self.dice
    }

    pub fn effects(&self) -> &E {
        &self.effects
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create_character(&mut self, id: CharacterId) -> Result<PsycheTracker, EngineError> {
        let tracker = self.store.create_character(id)?;
        tracing::info!(character = %id, "character meters created");
        Ok(tracker)
    }

    pub fn delete_character(&mut self, id: CharacterId) -> Result<(), EngineError> {
        self.store.delete_character(id)?;
        tracing::info!(character = %id, "character meters deleted");
        Ok(())
    }

    pub fn tracker(&self, id: CharacterId) -> Result<PsycheTracker, EngineError> {
        Ok(self.store.load_tracker(id)?)
    }

    /// Stress stage snapshot.
    pub fn get_state(&self, id: CharacterId) -> Result<StageState, EngineError> {
        let tracker = self.store.load_tracker(id)?;
        let state = StageState::for_value(tracker.stress().value());
        tracing::debug!(
            character = %id,
            stress = state.current_value,
            stage = %state.stage,
            requires_panic_check = state.requires_panic_check,
            "stress state"
        );
        Ok(state)
    }

    /// Corruption stage snapshot.
    pub fn get_corruption_state(&self, id: CharacterId) -> Result<StageState, EngineError> {
        let tracker = self.store.load_tracker(id)?;
        let state = StageState::for_value(tracker.corruption().value());
        tracing::debug!(
            character = %id,
            corruption = state.current_value,
            stage = %state.stage,
            "corruption state"
        );
        Ok(state)
    }

    pub fn detect_transition(&self, id: CharacterId, previous: i32, new: i32) -> StageTransition {
        let transition = StageTransition::detect(previous, new);
        tracing::debug!(
            character = %id,
            previous,
            new,
            critical = transition.is_critical_transition,
            "transition detected"
        );
        transition
    }

    /// Roll on the panic table. Only valid while stress is in severe instability.
    pub fn roll_panic_table(&mut self, id: CharacterId) -> Result<PanicResult, EngineError> {
        let actual = self.get_state(id)?.stage;
        if actual != Stage::SevereInstability {
            return Err(EngineError::WrongStage {
                required: Stage::SevereInstability,
                actual,
            });
        }
        let result = self.config.panic_table.roll(&mut self.dice)?;
        tracing::warn!(
            character = %id,
            roll = result.die_roll,
            effect = %result.effect_name,
            forces_action = result.forces_action,
            "panic roll"
        );
        Ok(result)
    }

    /// Apply a panic result's status effects. Call once per roll.
    pub fn apply_panic_effect(&mut self, id: CharacterId, result: &PanicResult) -> usize {
        let applied = panic::apply_panic_effect(&mut self.effects, id, result);
        if applied > 0 {
            tracing::info!(
                character = %id,
                effect = %result.effect_name,
                applied,
                "panic status effects applied"
            );
        }
        applied
    }

    pub fn is_recoverable(&self, id: CharacterId) -> Result<bool, EngineError> {
        Ok(transition::is_recoverable(self.get_state(id)?.stage))
    }

    pub fn get_recovery_protocol(&self, id: CharacterId) -> Result<RecoveryProtocol, EngineError> {
        Ok(RecoveryProtocol::for_stage(self.get_state(id)?.stage))
    }

    /// Apply stress, optionally letting the character resist part of it.
    pub fn apply_stress(
        &mut self,
        id: CharacterId,
        amount: i32,
        source: StressSource,
        resistance: Option<StressResistance>,
    ) -> Result<StressOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::NegativeAmount(amount));
        }
        let mut tracker = self.store.load_tracker(id)?;

        let (resistance_roll, reduction_percent) = match resistance {
            Some(r) => {
                let pool = roll_pool(&mut self.dice, r.dice_pool);
                let pct = resistance_reduction_percent(pool.net_successes());
                tracing::debug!(character = %id, dc = r.dc, roll = %pool, reduction = pct, "stress resistance");
                (Some(pool), pct)
            }
            None => (None, 0),
        };
        let reduced = reduce_stress(amount, reduction_percent);

        let delta = tracker.apply_delta(MeterKind::Stress, reduced);
        let mut entry = StressHistoryEntry::record(id, amount, source, &delta);
        if let Some(r) = resistance {
            entry = entry.with_resistance(r.dc, reduction_percent > 0);
        }
        let mut outcome = self.commit_stress(&tracker, delta, entry)?;
        outcome.resistance_roll = resistance_roll;
        outcome.reduction_percent = reduction_percent;
        Ok(outcome)
    }

    /// Recover stress through rest.
    pub fn recover_stress(
        &mut self,
        id: CharacterId,
        rest: RestType,
        will: i32,
    ) -> Result<StressOutcome, EngineError> {
        let mut tracker = self.store.load_tracker(id)?;
        let delta = match rest {
            RestType::Sanctuary => tracker.set_meter(MeterKind::Stress, 0),
            _ => tracker.apply_delta(MeterKind::Stress, -rest.recovery_amount(will)),
        };
        let entry = StressHistoryEntry::record(id, delta.requested, rest.source(), &delta);
        self.commit_stress(&tracker, delta, entry)
    }

    /// Recover a fixed amount of stress.
    pub fn recover_stress_by(
        &mut self,
        id: CharacterId,
        amount: i32,
        source: StressSource,
    ) -> Result<StressOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::NegativeAmount(amount));
        }
        let mut tracker = self.store.load_tracker(id)?;
        let delta = tracker.apply_delta(MeterKind::Stress, -amount);
        let entry = StressHistoryEntry::record(id, -amount, source, &delta);
        self.commit_stress(&tracker, delta, entry)
    }

    /// Reset stress after a trauma check has been resolved.
    pub fn reset_after_trauma_check(
        &mut self,
        id: CharacterId,
        passed: bool,
    ) -> Result<StressOutcome, EngineError> {
        let target = if passed {
            TRAUMA_PASS_RESET
        } else {
            TRAUMA_FAIL_RESET
        };
        let mut tracker = self.store.load_tracker(id)?;
        let delta = tracker.set_meter(MeterKind::Stress, target);
        let entry =
            StressHistoryEntry::record(id, delta.requested, StressSource::TraumaReset, &delta);
        self.commit_stress(&tracker, delta, entry)
    }

    fn commit_stress(
        &mut self,
        tracker: &PsycheTracker,
        delta: MeterDelta,
        entry: StressHistoryEntry,
    ) -> Result<StressOutcome, EngineError> {
        let id = tracker.character_id;
        self.store.commit_stress(tracker, &entry)?;

        let transition = StageTransition::detect(delta.previous, delta.new);
        tracing::info!(
            character = %id,
            source = %entry.source,
            requested = entry.amount,
            applied = entry.final_amount,
            previous = delta.previous,
            new = delta.new,
            "stress changed"
        );
        log_transition(id, "stress", &transition);

        let trauma_check_triggered = delta.new == METER_MAX;
        if trauma_check_triggered {
            tracing::warn!(character = %id, "stress maxed out, trauma check triggered");
        }

        Ok(StressOutcome {
            delta,
            transition,
            requires_panic_check: StageState::for_value(delta.new).requires_panic_check,
            trauma_check_triggered,
            entry,
            resistance_roll: None,
            reduction_percent: 0,
        })
    }

    pub fn add_corruption(
        &mut self,
        id: CharacterId,
        amount: i32,
        source: CorruptionSource,
    ) -> Result<CorruptionOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::NegativeAmount(amount));
        }
        self.change_corruption(id, amount, source)
    }

    /// Purge corruption. Threshold flags stay set.
    pub fn remove_corruption(
        &mut self,
        id: CharacterId,
        amount: i32,
        source: CorruptionSource,
    ) -> Result<CorruptionOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::NegativeAmount(amount));
        }
        self.change_corruption(id, -amount, source)
    }

    fn change_corruption(
        &mut self,
        id: CharacterId,
        amount: i32,
        source: CorruptionSource,
    ) -> Result<CorruptionOutcome, EngineError> {
        let mut tracker = self.store.load_tracker(id)?;
        let delta = tracker.apply_delta(MeterKind::Corruption, amount);
        let entry = CorruptionHistoryEntry::record(id, amount, source, &delta);
        self.store.commit_corruption(&tracker, &entry)?;
        Ok(corruption_outcome(&tracker, delta, entry))
    }

    /// Move corruption from one character to another in a single commit.
    ///
    /// The amount moved is limited by what the donor holds and by the
    /// recipient's room below 100; a short donor gives a partial transfer
    /// rather than an error. Each history entry names the other party as
    /// its transfer target.
    pub fn transfer_corruption(
        &mut self,
        from: CharacterId,
        to: CharacterId,
        amount: i32,
    ) -> Result<TransferOutcome, EngineError> {
        if amount < 0 {
            return Err(EngineError::NegativeAmount(amount));
        }
        if from == to {
            return Err(EngineError::SelfTransfer);
        }
        let mut donor = self.store.load_tracker(from)?;
        let mut recipient = self.store.load_tracker(to)?;

        let transferred = amount
            .min(donor.corruption().value())
            .min(METER_MAX - recipient.corruption().value());

        let donor_delta = donor.apply_delta(MeterKind::Corruption, -transferred);
        let recipient_delta = recipient.apply_delta(MeterKind::Corruption, transferred);
        let donor_entry =
            CorruptionHistoryEntry::record(from, -transferred, CorruptionSource::Transfer, &donor_delta)
                .as_transfer(to);
        let recipient_entry = CorruptionHistoryEntry::record(
            to,
            transferred,
            CorruptionSource::Transfer,
            &recipient_delta,
        )
        .as_transfer(from);

        self.store
            .commit_transfer((&donor, &donor_entry), (&recipient, &recipient_entry))?;

        tracing::info!(
            from = %from,
            to = %to,
            requested = amount,
            transferred,
            "corruption transferred"
        );

        Ok(TransferOutcome {
            requested: amount,
            transferred,
            donor: corruption_outcome(&donor, donor_delta, donor_entry),
            recipient: corruption_outcome(&recipient, recipient_delta, recipient_entry),
        })
    }

    /// Administrative clear of all corruption threshold flags.
    pub fn reset_threshold_flags(&mut self, id: CharacterId) -> Result<(), EngineError> {
        let mut tracker = self.store.load_tracker(id)?;
        tracker.reset_threshold_flags();
        self.store.save_tracker(&tracker)?;
        tracing::info!(character = %id, "corruption threshold flags reset");
        Ok(())
    }

    pub fn corruption_penalties(&self, id: CharacterId) -> Result<CorruptionPenalties, EngineError> {
        Ok(self.store.load_tracker(id)?.penalties())
    }

    /// Survival roll for a character at 100 corruption.
    pub fn resolve_terminal_corruption(
        &mut self,
        id: CharacterId,
        will: i32,
    ) -> Result<TerminalCorruptionOutcome, EngineError> {
        let tracker = self.store.load_tracker(id)?;
        let corruption = tracker.corruption().value();
        if corruption != METER_MAX {
            return Err(EngineError::NotTerminalCorruption(corruption));
        }

        let penalty = tracker.penalties().resolve_dice;
        let pool = roll_pool(&mut self.dice, will.saturating_sub(penalty));
        let survived = pool.net_successes() >= TERMINAL_SURVIVAL_SUCCESSES;

        let survival = if survived {
            let mut tracker = tracker;
            let delta = tracker.set_meter(MeterKind::Corruption, TERMINAL_SURVIVAL_VALUE);
            let entry = CorruptionHistoryEntry::record(
                id,
                delta.requested,
                CorruptionSource::TerminalSurvival,
                &delta,
            );
            self.store.commit_corruption(&tracker, &entry)?;
            tracing::warn!(character = %id, roll = %pool, "terminal corruption survived");
            Some(corruption_outcome(&tracker, delta, entry))
        } else {
            tracing::error!(character = %id, roll = %pool, "terminal corruption claimed the character");
            None
        };

        Ok(TerminalCorruptionOutcome {
            pool,
            successes_needed: TERMINAL_SURVIVAL_SUCCESSES,
            survived,
            lost: !survived,
            survival,
        })
    }

    pub fn stress_history(&self, id: CharacterId) -> Result<Vec<StressHistoryEntry>, EngineError> {
        Ok(self.store.stress_history(id)?)
    }

    pub fn corruption_history(
        &self,
        id: CharacterId,
    ) -> Result<Vec<CorruptionHistoryEntry>, EngineError> {
        Ok(self.store.corruption_history(id)?)
    }

    pub fn traumas(&self, id: CharacterId) -> Result<Vec<CharacterTrauma>, EngineError> {
        Ok(self.store.traumas(id)?)
    }

    /// Give a character a trauma, stacking it if already held.
    pub fn acquire_trauma(
        &mut self,
        id: CharacterId,
        trauma_id: &str,
        source: &str,
    ) -> Result<TraumaAcquisitionResult, EngineError> {
        let definition = self
            .config
            .trauma_catalog
            .get(trauma_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTrauma(trauma_id.to_string()))?;

        let held = self.store.traumas(id)?;
        let key = definition.id.to_lowercase();
        let existing = held.iter().find(|t| t.trauma_id == key);
        let acquisition = ledger::acquire(id, &definition, existing, source);

        if let Some(updated) = &acquisition.updated {
            self.store.save_trauma(updated)?;
        }

        let result = acquisition.result;
        if !result.success {
            tracing::debug!(character = %id, trauma = %result.trauma_id, "trauma cannot stack");
        } else if result.is_new_trauma {
            tracing::info!(character = %id, trauma = %result.trauma_id, source, "trauma acquired");
        } else {
            tracing::warn!(
                character = %id,
                trauma = %result.trauma_id,
                stacks = result.new_stack_count,
                "trauma stacked"
            );
        }
        if result.triggers_retirement_check {
            tracing::warn!(character = %id, message = %result.message, "trauma requires retirement check");
        }
        Ok(result)
    }

    pub fn check_retirement(&self, id: CharacterId) -> Result<RetirementCheckResult, EngineError> {
        let held = self.store.traumas(id)?;
        let result = retirement::evaluate(id, &held, &self.config.trauma_catalog);
        if result.must_retire {
            tracing::warn!(
                character = %id,
                reason = result.retirement_reason.as_deref().unwrap_or_default(),
                traumas = ?result.traumas_causing_retirement,
                "character must retire"
            );
        } else if result.can_continue_with_permission {
            tracing::info!(character = %id, "character eligible for optional retirement");
        }
        Ok(result)
    }

    /// Roll a trauma check; on failure, acquire the trauma named in `context`.
    pub fn perform_trauma_check(
        &mut self,
        id: CharacterId,
        trigger: TraumaCheckTrigger,
        context: &TraumaCheckContext,
    ) -> Result<TraumaCheckOutcome, EngineError> {
        if let Some(trauma_id) = &context.trauma_on_failure {
            if self.config.trauma_catalog.get(trauma_id).is_none() {
                return Err(EngineError::UnknownTrauma(trauma_id.clone()));
            }
        }
        let penalty = self.store.load_tracker(id)?.penalties().resolve_dice;
        let check = roll_trauma_check(&mut self.dice, id, trigger, context, penalty);

        let acquisition = match (&check.trauma_acquired, check.passed) {
            (Some(trauma_id), false) => {
                let trauma_id = trauma_id.clone();
                Some(self.acquire_trauma(id, &trauma_id, &trigger.to_string())?)
            }
            _ => None,
        };

        if check.passed {
            tracing::info!(character = %id, "{}", check);
        } else {
            tracing::warn!(character = %id, "{}", check);
        }
        Ok(TraumaCheckOutcome { check, acquisition })
    }
}

fn corruption_outcome(
    tracker: &PsycheTracker,
    delta: MeterDelta,
    entry: CorruptionHistoryEntry,
) -> CorruptionOutcome {
    let id = tracker.character_id;
    let transition = StageTransition::detect(delta.previous, delta.new);
    tracing::info!(
        character = %id,
        source = %entry.source,
        requested = entry.amount,
        applied = entry.final_amount,
        previous = delta.previous,
        new = delta.new,
        threshold = ?delta.threshold_crossed,
        "corruption changed"
    );
    log_transition(id, "corruption", &transition);

    let is_terminal_corruption = delta.new == METER_MAX;
    CorruptionOutcome {
        delta,
        transition,
        entry,
        penalties: tracker.penalties(),
        is_terminal_corruption,
    }
}

fn log_transition(id: CharacterId, meter: &'static str, transition: &StageTransition) {
    if transition.entered_terminal {
        tracing::error!(character = %id, meter, value = transition.new_value, "entered terminal stage");
    } else if transition.entered_severe {
        tracing::warn!(character = %id, meter, value = transition.new_value, "entered severe instability");
    } else if transition.stage_changed {
        tracing::info!(
            character = %id,
            meter,
            from = %transition.previous_stage,
            to = %transition.new_stage,
            worsened = transition.worsened(),
            "stage changed"
        );
    }
}
