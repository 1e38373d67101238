//! Append-only audit history of meter mutations.
//!
//! Every change to a stress or corruption meter produces exactly one entry.
//! Entries are built here and handed to a [`PsycheStore`] together with the
//! new meter value so both land in the same commit.
//!
//! [`PsycheStore`]: crate::store::PsycheStore

use crate::meter::{CharacterId, CorruptionThreshold, MeterDelta, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What caused a change in stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StressSource {
    Combat,
    Exploration,
    Environmental,
    Forbidden,
    Narrative,
    Corruption,
    ShortRest,
    LongRest,
    Sanctuary,
    Milestone,
    TraumaReset,
    Recovery,
    Administrative,
}

impl fmt::Display for StressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StressSource::Combat => "Combat",
            StressSource::Exploration => "Exploration",
            StressSource::Environmental => "Environmental",
            StressSource::Forbidden => "Forbidden Knowledge",
            StressSource::Narrative => "Narrative",
            StressSource::Corruption => "Corruption",
            StressSource::ShortRest => "Short Rest",
            StressSource::LongRest => "Long Rest",
            StressSource::Sanctuary => "Sanctuary",
            StressSource::Milestone => "Milestone",
            StressSource::TraumaReset => "Trauma Check Reset",
            StressSource::Recovery => "Recovery",
            StressSource::Administrative => "Administrative",
        };
        f.write_str(s)
    }
}

/// What caused a change in corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorruptionSource {
    ForbiddenMagic,
    ForbiddenAbility,
    Artifact,
    Environmental,
    Consumable,
    Ritual,
    ForsakenContact,
    Transfer,
    Purification,
    TerminalSurvival,
    Administrative,
}

impl fmt::Display for CorruptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorruptionSource::ForbiddenMagic => "Forbidden Magic",
            CorruptionSource::ForbiddenAbility => "Forbidden Ability",
            CorruptionSource::Artifact => "Cursed Artifact",
            CorruptionSource::Environmental => "Environmental Exposure",
            CorruptionSource::Consumable => "Tainted Consumable",
            CorruptionSource::Ritual => "Ritual",
            CorruptionSource::ForsakenContact => "Contact With the Forsaken",
            CorruptionSource::Transfer => "Transfer",
            CorruptionSource::Purification => "Purification",
            CorruptionSource::TerminalSurvival => "Survived Terminal Corruption",
            CorruptionSource::Administrative => "Administrative",
        };
        f.write_str(s)
    }
}

/// One stress mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressHistoryEntry {
    pub id: Uuid,
    pub character_id: CharacterId,
    /// Signed delta requested by the caller.
    pub amount: i32,
    /// Delta actually applied after resistance and clamping.
    pub final_amount: i32,
    pub source: StressSource,
    pub previous_value: i32,
    pub new_value: i32,
    pub resist_dc: Option<u32>,
    pub resisted: bool,
    /// Stage entered, when this change moved stress up a stage.
    pub threshold_crossed: Option<Stage>,
    pub created_at: DateTime<Utc>,
}

impl StressHistoryEntry {
    /// Entry for an applied delta. `amount` is the caller's request, which
    /// may differ from `delta.requested` when resistance reduced it.
    pub fn record(
        character_id: CharacterId,
        amount: i32,
        source: StressSource,
        delta: &MeterDelta,
    ) -> Self {
        let previous_stage = Stage::of(delta.previous);
        let new_stage = Stage::of(delta.new);
        Self {
            id: Uuid::new_v4(),
            character_id,
            amount,
            final_amount: delta.applied(),
            source,
            previous_value: delta.previous,
            new_value: delta.new,
            resist_dc: None,
            resisted: false,
            threshold_crossed: (new_stage > previous_stage).then_some(new_stage),
            created_at: Utc::now(),
        }
    }

    pub fn with_resistance(mut self, dc: u32, resisted: bool) -> Self {
        self.resist_dc = Some(dc);
        self.resisted = resisted;
        self
    }
}

/// One corruption mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionHistoryEntry {
    pub id: Uuid,
    pub character_id: CharacterId,
    pub amount: i32,
    pub final_amount: i32,
    pub source: CorruptionSource,
    pub previous_value: i32,
    pub new_value: i32,
    pub resist_dc: Option<u32>,
    pub resisted: bool,
    /// Highest threshold flag newly set by this change.
    pub threshold_crossed: Option<CorruptionThreshold>,
    pub is_transfer: bool,
    pub transfer_target_id: Option<CharacterId>,
    pub created_at: DateTime<Utc>,
}

impl CorruptionHistoryEntry {
    pub fn record(
        character_id: CharacterId,
        amount: i32,
        source: CorruptionSource,
        delta: &MeterDelta,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            character_id,
            amount,
            final_amount: delta.applied(),
            source,
            previous_value: delta.previous,
            new_value: delta.new,
            resist_dc: None,
            resisted: false,
            threshold_crossed: delta.threshold_crossed,
            is_transfer: false,
            transfer_target_id: None,
            created_at: Utc::now(),
        }
    }

    /// Mark this entry as one side of a transfer to `target`.
    pub fn as_transfer(mut self, target: CharacterId) -> Self {
        self.is_transfer = true;
        self.transfer_target_id = Some(target);
        self
    }
}
