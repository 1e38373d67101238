//! Traumas: what they are, how characters gain them, and when they end a career.

pub mod check;
pub mod definition;
pub mod ledger;
pub mod retirement;

pub use check::{
    roll_trauma_check, PoolModifier, TraumaCheckContext, TraumaCheckResult, TraumaCheckTrigger,
    TriggerSeverity,
};
pub use definition::{CatalogError, RetirementRule, TraumaCatalog, TraumaCategory, TraumaDefinition};
pub use ledger::{CharacterTrauma, TraumaAcquisitionResult};
pub use retirement::RetirementCheckResult;
