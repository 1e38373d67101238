//! Dice service and success-counting pool resolution.
//!
//! Every random outcome in the crate goes through a [`DiceRoller`], which is
//! passed in explicitly. Production code uses [`RngDice`]; tests use the
//! scripted roller from [`crate::testing`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest die face that counts as a success in a pool roll.
pub const SUCCESS_THRESHOLD: u32 = 8;

/// Die face that counts as a botch in a pool roll.
pub const BOTCH_FACE: u32 = 1;

/// Net successes at or above this are a critical success.
pub const CRITICAL_NET_SUCCESSES: i32 = 5;

/// Standard die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Raw output of the dice service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub die_type: DieType,
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}

impl RollResult {
    pub fn new(die_type: DieType, rolls: Vec<u32>, modifier: i32) -> Self {
        let total = rolls.iter().map(|r| *r as i32).sum::<i32>() + modifier;
        Self {
            die_type,
            rolls,
            modifier,
            total,
        }
    }

    /// Dice expression for display, e.g. `4d10` or `1d10+2`.
    pub fn expression(&self) -> String {
        dice_expression(self.rolls.len() as u32, self.die_type, self.modifier)
    }

    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let dice_str = format!(
            "[{}]",
            self.rolls
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if self.modifier > 0 {
            format!("{} + {}", dice_str, self.modifier)
        } else if self.modifier < 0 {
            format!("{} - {}", dice_str, self.modifier.abs())
        } else {
            dice_str
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// Format `count`, `die` and `modifier` as dice notation.
pub fn dice_expression(count: u32, die: DieType, modifier: i32) -> String {
    match modifier {
        0 => format!("{count}{die}"),
        m if m > 0 => format!("{count}{die}+{m}"),
        m => format!("{count}{die}{m}"),
    }
}

/// The injectable dice service.
pub trait DiceRoller {
    /// Roll `count` dice of `die` and add `modifier` to the total.
    fn roll(&mut self, die: DieType, count: u32, modifier: i32) -> RollResult;
}

impl<T: DiceRoller + ?Sized> DiceRoller for &mut T {
    fn roll(&mut self, die: DieType, count: u32, modifier: i32) -> RollResult {
        (**self).roll(die, count, modifier)
    }
}

impl<T: DiceRoller + ?Sized> DiceRoller for Box<T> {
    fn roll(&mut self, die: DieType, count: u32, modifier: i32) -> RollResult {
        (**self).roll(die, count, modifier)
    }
}

/// Dice backed by any [`rand::Rng`].
#[derive(Debug, Clone)]
pub struct RngDice<R> {
    rng: R,
}

impl<R: Rng> RngDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngDice<StdRng> {
    /// Deterministic dice for replays and tests.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Dice seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> DiceRoller for RngDice<R> {
    fn roll(&mut self, die: DieType, count: u32, modifier: i32) -> RollResult {
        let rolls = (0..count)
            .map(|_| self.rng.gen_range(1..=die.sides()))
            .collect();
        RollResult::new(die, rolls, modifier)
    }
}

/// Outcome of a success-counting d10 pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResult {
    pub rolls: Vec<u32>,
    pub successes: u32,
    pub botches: u32,
}

impl PoolResult {
    /// Count successes and botches over already-rolled faces.
    pub fn from_faces(rolls: Vec<u32>) -> Self {
        let successes = rolls.iter().filter(|&&r| r >= SUCCESS_THRESHOLD).count() as u32;
        let botches = rolls.iter().filter(|&&r| r == BOTCH_FACE).count() as u32;
        Self {
            rolls,
            successes,
            botches,
        }
    }

    pub fn pool_size(&self) -> u32 {
        self.rolls.len() as u32
    }

    /// Successes minus botches. May be negative.
    pub fn net_successes(&self) -> i32 {
        self.successes as i32 - self.botches as i32
    }

    pub fn is_critical_success(&self) -> bool {
        self.net_successes() >= CRITICAL_NET_SUCCESSES
    }

    /// No successes and at least one botch.
    pub fn is_fumble(&self) -> bool {
        self.successes == 0 && self.botches > 0
    }

    pub fn expression(&self) -> String {
        dice_expression(self.pool_size(), DieType::D10, 0)
    }
}

impl fmt::Display for PoolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} -> {} net ({} successes, {} botches)",
            self.expression(),
            self.rolls,
            self.net_successes(),
            self.successes,
            self.botches
        )
    }
}

/// Roll a d10 pool. Pool sizes below 1 are rolled as a single die.
pub fn roll_pool<D: DiceRoller + ?Sized>(dice: &mut D, requested: i32) -> PoolResult {
    let size = requested.max(1) as u32;
    let roll = dice.roll(DieType::D10, size, 0);
    PoolResult::from_faces(roll.rolls)
}
