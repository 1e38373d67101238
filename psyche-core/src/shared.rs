//! A cloneable async handle that serializes access to one engine.
//!
//! All operations take the engine lock for their full duration, so two
//! mutations of the same character can never interleave. Multi-step
//! sequences go through [`SharedEngine::with_engine`].

use crate::dice::DiceRoller;
use crate::engine::{CorruptionOutcome, EngineError, PsycheEngine, StressOutcome, StressResistance};
use crate::history::{CorruptionSource, StressSource};
use crate::meter::CharacterId;
use crate::panic::{PanicResult, StatusEffectService};
use crate::store::PsycheStore;
use crate::transition::StageState;
use crate::trauma::{RetirementCheckResult, TraumaAcquisitionResult};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SharedEngine<S, D, E> {
    inner: Arc<Mutex<PsycheEngine<S, D, E>>>,
}

impl<S, D, E> Clone for SharedEngine<S, D, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, D, E> SharedEngine<S, D, E>
where
    S: PsycheStore,
    D: DiceRoller,
    E: StatusEffectService,
{
    pub fn new(engine: PsycheEngine<S, D, E>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut PsycheEngine<S, D, E>) -> R) -> R {
        let mut engine = self.inner.lock().await;
        f(&mut engine)
    }

    pub async fn create_character(&self, id: CharacterId) -> Result<(), EngineError> {
        self.with_engine(|e| e.create_character(id).map(|_| ())).await
    }

    pub async fn get_state(&self, id: CharacterId) -> Result<StageState, EngineError> {
        self.with_engine(|e| e.get_state(id)).await
    }

    pub async fn apply_stress(
        &self,
        id: CharacterId,
        amount: i32,
        source: StressSource,
        resistance: Option<StressResistance>,
    ) -> Result<StressOutcome, EngineError> {
        self.with_engine(|e| e.apply_stress(id, amount, source, resistance))
            .await
    }

    pub async fn add_corruption(
        &self,
        id: CharacterId,
        amount: i32,
        source: CorruptionSource,
    ) -> Result<CorruptionOutcome, EngineError> {
        self.with_engine(|e| e.add_corruption(id, amount, source)).await
    }

    /// Roll the panic table and apply its effects under one lock.
    pub async fn panic(&self, id: CharacterId) -> Result<PanicResult, EngineError> {
        self.with_engine(|e| {
            let result = e.roll_panic_table(id)?;
            e.apply_panic_effect(id, &result);
            Ok(result)
        })
        .await
    }

    pub async fn acquire_trauma(
        &self,
        id: CharacterId,
        trauma_id: &str,
        source: &str,
    ) -> Result<TraumaAcquisitionResult, EngineError> {
        self.with_engine(|e| e.acquire_trauma(id, trauma_id, source))
            .await
    }

    pub async fn check_retirement(
        &self,
        id: CharacterId,
    ) -> Result<RetirementCheckResult, EngineError> {
        self.with_engine(|e| e.check_retirement(id)).await
    }
}
