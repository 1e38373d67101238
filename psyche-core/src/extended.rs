//! Multi-round extended checks.
//!
//! An extended check accumulates net successes over several pool rolls until
//! it reaches its target, runs out of rounds, or collapses after three
//! fumbles in a row.

use crate::dice::{roll_pool, DiceRoller, PoolResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default round limit.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Accumulated progress lost on a fumbled round.
pub const FUMBLE_PENALTY: u32 = 2;

/// Consecutive fumbles that end the check catastrophically.
pub const CATASTROPHIC_FUMBLES: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtendedCheckError {
    #[error("Extended check needs a target of at least 1 success (got {0})")]
    InvalidTarget(u32),
    #[error("Extended check needs at least 1 round (got {0})")]
    InvalidMaxRounds(u32),
    #[error("Extended check is already resolved as {0:?}")]
    AlreadyResolved(ExtendedCheckStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    RoundsExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtendedCheckStatus {
    InProgress,
    Succeeded,
    Failed(FailureReason),
    CatastrophicFailure,
}

impl ExtendedCheckStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtendedCheckStatus::InProgress)
    }
}

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub pool: PoolResult,
    pub fumbled: bool,
    pub accumulated_after: u32,
    pub status_after: ExtendedCheckStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedCheck {
    target_successes: u32,
    max_rounds: u32,
    accumulated: u32,
    rounds_taken: u32,
    consecutive_fumbles: u32,
    status: ExtendedCheckStatus,
    rounds: Vec<RoundRecord>,
}

impl ExtendedCheck {
    pub fn new(target_successes: u32, max_rounds: u32) -> Result<Self, ExtendedCheckError> {
        if target_successes < 1 {
            return Err(ExtendedCheckError::InvalidTarget(target_successes));
        }
        if max_rounds < 1 {
            return Err(ExtendedCheckError::InvalidMaxRounds(max_rounds));
        }
        Ok(Self {
            target_successes,
            max_rounds,
            accumulated: 0,
            rounds_taken: 0,
            consecutive_fumbles: 0,
            status: ExtendedCheckStatus::InProgress,
            rounds: Vec::new(),
        })
    }

    /// Check with the default round limit.
    pub fn with_target(target_successes: u32) -> Result<Self, ExtendedCheckError> {
        Self::new(target_successes, DEFAULT_MAX_ROUNDS)
    }

    pub fn target_successes(&self) -> u32 {
        self.target_successes
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn rounds_taken(&self) -> u32 {
        self.rounds_taken
    }

    pub fn consecutive_fumbles(&self) -> u32 {
        self.consecutive_fumbles
    }

    pub fn status(&self) -> ExtendedCheckStatus {
        self.status
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Roll one round with the given pool size.
    pub fn roll_round<D: DiceRoller + ?Sized>(
        &mut self,
        dice: &mut D,
        pool_size: i32,
    ) -> Result<&RoundRecord, ExtendedCheckError> {
        let pool = roll_pool(dice, pool_size);
        self.apply_round(pool)
    }

    /// Fold an already-rolled pool into the check.
    pub fn apply_round(&mut self, pool: PoolResult) -> Result<&RoundRecord, ExtendedCheckError> {
        if self.status.is_terminal() {
            return Err(ExtendedCheckError::AlreadyResolved(self.status));
        }

        self.rounds_taken += 1;
        let fumbled = pool.is_fumble();

        let net = pool.net_successes();
        self.accumulated = (self.accumulated as i64 + net as i64).max(0) as u32;

        if fumbled {
            self.accumulated = self.accumulated.saturating_sub(FUMBLE_PENALTY);
            self.consecutive_fumbles += 1;
        } else if pool.successes > 0 {
            self.consecutive_fumbles = 0;
        }

        self.status = if self.consecutive_fumbles >= CATASTROPHIC_FUMBLES {
            ExtendedCheckStatus::CatastrophicFailure
        } else if self.accumulated >= self.target_successes {
            ExtendedCheckStatus::Succeeded
        } else if self.rounds_taken >= self.max_rounds {
            ExtendedCheckStatus::Failed(FailureReason::RoundsExhausted)
        } else {
            ExtendedCheckStatus::InProgress
        };

        tracing::debug!(
            round = self.rounds_taken,
            net,
            fumbled,
            accumulated = self.accumulated,
            target = self.target_successes,
            status = ?self.status,
            "extended check round"
        );

        self.rounds.push(RoundRecord {
            round: self.rounds_taken,
            pool,
            fumbled,
            accumulated_after: self.accumulated,
            status_after: self.status,
        });
        Ok(&self.rounds[self.rounds.len() - 1])
    }

    /// Roll rounds until the check resolves.
    pub fn run_to_completion<D: DiceRoller + ?Sized>(
        &mut self,
        dice: &mut D,
        pool_size: i32,
    ) -> ExtendedCheckStatus {
        while !self.status.is_terminal() {
            let pool = roll_pool(dice, pool_size);
            if self.apply_round(pool).is_err() {
                break;
            }
        }
        self.status
    }
}
