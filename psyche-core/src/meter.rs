//! Stress and corruption meters.
//!
//! Both meters hold a value clamped to `0..=100`. The [`Stage`] of a meter is
//! a pure function of that value. The corruption meter also carries three
//! one-way threshold flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const METER_MIN: i32 = 0;
pub const METER_MAX: i32 = 100;

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity stage of a meter, ordered from calm to terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    None,
    EarlyWarning,
    ModerateInstability,
    SevereInstability,
    Terminal,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::None,
        Stage::EarlyWarning,
        Stage::ModerateInstability,
        Stage::SevereInstability,
        Stage::Terminal,
    ];

    /// Stage for a meter value. Out-of-range values are clamped first.
    pub fn of(value: i32) -> Stage {
        match clamp_meter(value) {
            0..=19 => Stage::None,
            20..=39 => Stage::EarlyWarning,
            40..=59 => Stage::ModerateInstability,
            60..=79 => Stage::SevereInstability,
            _ => Stage::Terminal,
        }
    }

    /// Lowest meter value belonging to this stage.
    pub fn floor(&self) -> i32 {
        match self {
            Stage::None => 0,
            Stage::EarlyWarning => 20,
            Stage::ModerateInstability => 40,
            Stage::SevereInstability => 60,
            Stage::Terminal => 80,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::EarlyWarning => "Early Warning",
            Stage::ModerateInstability => "Moderate Instability",
            Stage::SevereInstability => "Severe Instability",
            Stage::Terminal => "Terminal",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn clamp_meter(value: i32) -> i32 {
    value.clamp(METER_MIN, METER_MAX)
}

/// Which of the two meters an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterKind {
    Stress,
    Corruption,
}

/// A clamped meter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct MeterState {
    value: i32,
}

impl MeterState {
    pub fn new(value: i32) -> Self {
        Self {
            value: clamp_meter(value),
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn stage(&self) -> Stage {
        Stage::of(self.value)
    }
}

impl TryFrom<i32> for MeterState {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (METER_MIN..=METER_MAX).contains(&value) {
            Ok(Self { value })
        } else {
            Err(format!("meter value {value} outside {METER_MIN}..={METER_MAX}"))
        }
    }
}

impl From<MeterState> for i32 {
    fn from(state: MeterState) -> i32 {
        state.value
    }
}

/// One-time corruption thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CorruptionThreshold {
    Quarter,
    Half,
    ThreeQuarters,
}

impl CorruptionThreshold {
    pub const ALL: [CorruptionThreshold; 3] = [
        CorruptionThreshold::Quarter,
        CorruptionThreshold::Half,
        CorruptionThreshold::ThreeQuarters,
    ];

    pub fn value(&self) -> i32 {
        match self {
            CorruptionThreshold::Quarter => 25,
            CorruptionThreshold::Half => 50,
            CorruptionThreshold::ThreeQuarters => 75,
        }
    }
}

/// Monotonic flags on the corruption meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThresholdFlags {
    pub crossed_25: bool,
    pub crossed_50: bool,
    pub crossed_75: bool,
}

impl ThresholdFlags {
    pub fn is_set(&self, threshold: CorruptionThreshold) -> bool {
        match threshold {
            CorruptionThreshold::Quarter => self.crossed_25,
            CorruptionThreshold::Half => self.crossed_50,
            CorruptionThreshold::ThreeQuarters => self.crossed_75,
        }
    }

    /// Set a flag. Returns `true` only if it was previously clear.
    pub fn set(&mut self, threshold: CorruptionThreshold) -> bool {
        let flag = match threshold {
            CorruptionThreshold::Quarter => &mut self.crossed_25,
            CorruptionThreshold::Half => &mut self.crossed_50,
            CorruptionThreshold::ThreeQuarters => &mut self.crossed_75,
        };
        let newly_set = !*flag;
        *flag = true;
        newly_set
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Result of applying a delta to a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterDelta {
    pub meter: MeterKind,
    pub requested: i32,
    pub previous: i32,
    pub new: i32,
    /// Highest corruption threshold newly set by this change.
    pub threshold_crossed: Option<CorruptionThreshold>,
}

impl MeterDelta {
    /// Delta actually applied after clamping.
    pub fn applied(&self) -> i32 {
        self.new - self.previous
    }
}

/// The two meters and corruption flags of one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsycheTracker {
    pub character_id: CharacterId,
    stress: MeterState,
    corruption: MeterState,
    flags: ThresholdFlags,
}

impl PsycheTracker {
    /// Fresh tracker for a newly created character.
    pub fn new(character_id: CharacterId) -> Self {
        Self {
            character_id,
            stress: MeterState::default(),
            corruption: MeterState::default(),
            flags: ThresholdFlags::default(),
        }
    }

    /// Rebuild a tracker from stored values. Values are clamped.
    pub fn from_parts(
        character_id: CharacterId,
        stress: i32,
        corruption: i32,
        flags: ThresholdFlags,
    ) -> Self {
        Self {
            character_id,
            stress: MeterState::new(stress),
            corruption: MeterState::new(corruption),
            flags,
        }
    }

    pub fn stress(&self) -> MeterState {
        self.stress
    }

    pub fn corruption(&self) -> MeterState {
        self.corruption
    }

    pub fn meter(&self, kind: MeterKind) -> MeterState {
        match kind {
            MeterKind::Stress => self.stress,
            MeterKind::Corruption => self.corruption,
        }
    }

    pub fn flags(&self) -> ThresholdFlags {
        self.flags
    }

    /// Apply a signed delta, clamping and updating corruption flags.
    pub fn apply_delta(&mut self, meter: MeterKind, amount: i32) -> MeterDelta {
        let previous = self.meter(meter).value();
        let new = clamp_meter(previous.saturating_add(amount));
        self.set_value(meter, new, amount)
    }

    /// Set a meter to an absolute value, recorded as a delta.
    pub fn set_meter(&mut self, meter: MeterKind, value: i32) -> MeterDelta {
        let previous = self.meter(meter).value();
        let new = clamp_meter(value);
        self.set_value(meter, new, new - previous)
    }

    fn set_value(&mut self, meter: MeterKind, new: i32, requested: i32) -> MeterDelta {
        let previous = self.meter(meter).value();
        let mut threshold_crossed = None;
        match meter {
            MeterKind::Stress => self.stress = MeterState::new(new),
            MeterKind::Corruption => {
                self.corruption = MeterState::new(new);
                for threshold in CorruptionThreshold::ALL {
                    let crossed = previous < threshold.value() && new >= threshold.value();
                    if crossed && self.flags.set(threshold) {
                        threshold_crossed = Some(threshold);
                    }
                }
            }
        }
        MeterDelta {
            meter,
            requested,
            previous,
            new,
            threshold_crossed,
        }
    }

    pub fn reset_threshold_flags(&mut self) {
        self.flags.clear();
    }

    pub fn penalties(&self) -> CorruptionPenalties {
        CorruptionPenalties::for_corruption(self.corruption.value())
    }
}

/// Resource penalties derived from corruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionPenalties {
    pub max_hp_percent: i32,
    pub max_ap_percent: i32,
    pub resolve_dice: i32,
}

impl CorruptionPenalties {
    pub fn for_corruption(corruption: i32) -> Self {
        let c = clamp_meter(corruption);
        Self {
            max_hp_percent: (c / 10) * 5,
            max_ap_percent: (c / 10) * 5,
            resolve_dice: c / 20,
        }
    }
}

/// Fraction of incoming stress shrugged off for a number of net successes.
pub fn resistance_reduction_percent(net_successes: i32) -> i32 {
    match net_successes {
        i32::MIN..=0 => 0,
        1 => 50,
        2..=3 => 75,
        _ => 100,
    }
}

/// Stress remaining after resistance.
pub fn reduce_stress(amount: i32, reduction_percent: i32) -> i32 {
    let amount = i64::from(amount);
    let reduced = amount - amount * i64::from(reduction_percent.clamp(0, 100)) / 100;
    i32::try_from(reduced).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_boundaries() {
        assert_eq!(Stage::of(0), Stage::None);
        assert_eq!(Stage::of(19), Stage::None);
        assert_eq!(Stage::of(20), Stage::EarlyWarning);
        assert_eq!(Stage::of(39), Stage::EarlyWarning);
        assert_eq!(Stage::of(40), Stage::ModerateInstability);
        assert_eq!(Stage::of(59), Stage::ModerateInstability);
        assert_eq!(Stage::of(60), Stage::SevereInstability);
        assert_eq!(Stage::of(79), Stage::SevereInstability);
        assert_eq!(Stage::of(80), Stage::Terminal);
        assert_eq!(Stage::of(100), Stage::Terminal);
    }

    #[test]
    fn test_stage_floor_matches_table() {
        for stage in Stage::ALL {
            assert_eq!(Stage::of(stage.floor()), stage);
        }
    }

    #[test]
    fn test_apply_delta_clamps() {
        let mut tracker = PsycheTracker::new(CharacterId::new());
        let delta = tracker.apply_delta(MeterKind::Stress, 150);
        assert_eq!(delta.previous, 0);
        assert_eq!(delta.new, 100);
        assert_eq!(delta.requested, 150);
        assert_eq!(delta.applied(), 100);

        let delta = tracker.apply_delta(MeterKind::Stress, -500);
        assert_eq!(delta.new, 0);
        assert_eq!(tracker.stress().value(), 0);
    }

    #[test]
    fn test_meter_state_rejects_out_of_range_on_deserialize() {
        assert!(serde_json::from_str::<MeterState>("101").is_err());
        assert!(serde_json::from_str::<MeterState>("-1").is_err());
        assert_eq!(serde_json::from_str::<MeterState>("42").unwrap().value(), 42);
    }

    #[test]
    fn test_threshold_flags_set_on_crossing() {
        let mut tracker = PsycheTracker::new(CharacterId::new());
        let delta = tracker.apply_delta(MeterKind::Corruption, 30);
        assert_eq!(delta.threshold_crossed, Some(CorruptionThreshold::Quarter));
        assert!(tracker.flags().crossed_25);
        assert!(!tracker.flags().crossed_50);

        let delta = tracker.apply_delta(MeterKind::Corruption, 50);
        assert_eq!(
            delta.threshold_crossed,
            Some(CorruptionThreshold::ThreeQuarters)
        );
        assert!(tracker.flags().crossed_50);
        assert!(tracker.flags().crossed_75);
    }

    #[test]
    fn test_threshold_flags_are_idempotent_and_monotonic() {
        let mut tracker = PsycheTracker::new(CharacterId::new());
        tracker.apply_delta(MeterKind::Corruption, 55);
        tracker.apply_delta(MeterKind::Corruption, -40);
        assert!(tracker.flags().crossed_50);

        let delta = tracker.apply_delta(MeterKind::Corruption, 40);
        assert_eq!(delta.threshold_crossed, None);
        assert_eq!(
            tracker.flags(),
            ThresholdFlags {
                crossed_25: true,
                crossed_50: true,
                crossed_75: false
            }
        );

        let mut flags = tracker.flags();
        assert!(!flags.set(CorruptionThreshold::Half));
    }

    #[test]
    fn test_reset_flags_need_a_fresh_upward_crossing() {
        let mut tracker = PsycheTracker::new(CharacterId::new());
        tracker.apply_delta(MeterKind::Corruption, 80);
        tracker.reset_threshold_flags();

        let delta = tracker.apply_delta(MeterKind::Corruption, -10);
        assert_eq!(delta.threshold_crossed, None);
        let delta = tracker.apply_delta(MeterKind::Corruption, 4);
        assert_eq!(delta.threshold_crossed, None);
        assert_eq!(tracker.flags(), ThresholdFlags::default());

        tracker.apply_delta(MeterKind::Corruption, -30);
        let delta = tracker.apply_delta(MeterKind::Corruption, 35);
        assert_eq!(delta.threshold_crossed, Some(CorruptionThreshold::ThreeQuarters));
        assert!(!tracker.flags().crossed_25);
        assert!(tracker.flags().crossed_50 && tracker.flags().crossed_75);
    }

    #[test]
    fn test_stress_never_touches_flags() {
        let mut tracker = PsycheTracker::new(CharacterId::new());
        let delta = tracker.apply_delta(MeterKind::Stress, 90);
        assert_eq!(delta.threshold_crossed, None);
        assert_eq!(tracker.flags(), ThresholdFlags::default());
    }

    #[test]
    fn test_penalties() {
        let p = CorruptionPenalties::for_corruption(100);
        assert_eq!(p.max_hp_percent, 50);
        assert_eq!(p.resolve_dice, 5);
        let p = CorruptionPenalties::for_corruption(39);
        assert_eq!(p.max_hp_percent, 15);
        assert_eq!(p.resolve_dice, 1);
    }

    #[test]
    fn test_resistance_table() {
        assert_eq!(resistance_reduction_percent(-1), 0);
        assert_eq!(resistance_reduction_percent(0), 0);
        assert_eq!(resistance_reduction_percent(1), 50);
        assert_eq!(resistance_reduction_percent(3), 75);
        assert_eq!(resistance_reduction_percent(4), 100);
        assert_eq!(reduce_stress(15, 50), 8);
        assert_eq!(reduce_stress(15, 100), 0);
        assert_eq!(reduce_stress(i32::MAX, 50), 1_073_741_824);
    }
}
