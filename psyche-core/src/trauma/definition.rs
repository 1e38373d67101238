//! Trauma definitions and the catalog they are looked up in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate trauma id: {0}")]
    DuplicateId(String),
    #[error("Trauma id must not be empty")]
    EmptyId,
    #[error("Invalid retirement condition {0:?}, expected \"On acquisition\" or \"<n>+\"")]
    InvalidRetirementRule(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// When holding a trauma forces a character out of play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RetirementRule {
    Never,
    OnAcquisition,
    /// Once the stack count reaches `n`.
    AtStacks(u32),
}

impl RetirementRule {
    /// Whether a trauma held at `stack_count` mandates retirement.
    pub fn is_met(&self, stack_count: u32) -> bool {
        match self {
            RetirementRule::Never => false,
            RetirementRule::OnAcquisition => true,
            RetirementRule::AtStacks(n) => stack_count >= *n,
        }
    }
}

impl FromStr for RetirementRule {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("never") {
            return Ok(RetirementRule::Never);
        }
        if trimmed.eq_ignore_ascii_case("on acquisition") {
            return Ok(RetirementRule::OnAcquisition);
        }
        trimmed
            .strip_suffix('+')
            .and_then(|n| n.trim().parse::<u32>().ok())
            .filter(|n| *n >= 1)
            .map(RetirementRule::AtStacks)
            .ok_or_else(|| CatalogError::InvalidRetirementRule(s.to_string()))
    }
}

impl TryFrom<String> for RetirementRule {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RetirementRule> for String {
    fn from(rule: RetirementRule) -> String {
        rule.to_string()
    }
}

impl fmt::Display for RetirementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetirementRule::Never => f.write_str("Never"),
            RetirementRule::OnAcquisition => f.write_str("On acquisition"),
            RetirementRule::AtStacks(n) => write!(f, "{n}+"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraumaCategory {
    Cognitive,
    Emotional,
    Behavioral,
    Existential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraumaDefinition {
    pub id: String,
    pub name: String,
    pub category: TraumaCategory,
    pub description: String,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default = "never")]
    pub retirement: RetirementRule,
}

fn never() -> RetirementRule {
    RetirementRule::Never
}

impl TraumaDefinition {
    pub fn new(id: &str, name: &str, category: TraumaCategory, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            description: description.to_string(),
            stackable: false,
            retirement: RetirementRule::Never,
        }
    }

    pub fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    pub fn with_retirement(mut self, rule: RetirementRule) -> Self {
        self.retirement = rule;
        self
    }
}

lazy_static::lazy_static! {
    /// Traumas available without loading any content.
    pub static ref DEFAULT_TRAUMAS: Vec<TraumaDefinition> = vec![
        TraumaDefinition::new("reality-doubt", "Reality Doubt", TraumaCategory::Cognitive,
            "You can no longer trust that what you see is really there.")
            .stackable()
            .with_retirement(RetirementRule::AtStacks(5)),
        TraumaDefinition::new("night-terrors", "Night Terrors", TraumaCategory::Emotional,
            "Sleep brings back what you saw. Rest is harder to come by.")
            .stackable(),
        TraumaDefinition::new("hypervigilance", "Hypervigilance", TraumaCategory::Behavioral,
            "Every shadow is a threat. You cannot stand still with your back exposed.")
            .stackable()
            .with_retirement(RetirementRule::AtStacks(3)),
        TraumaDefinition::new("survivors-guilt", "Survivor's Guilt", TraumaCategory::Emotional,
            "You lived when others did not, and you know it."),
        TraumaDefinition::new("isolophobia", "Isolophobia", TraumaCategory::Behavioral,
            "Being alone, even briefly, brings on a rising panic.")
            .stackable(),
        TraumaDefinition::new("hollow-self", "Hollow Self", TraumaCategory::Existential,
            "Something essential is gone. You go through the motions of being yourself.")
            .with_retirement(RetirementRule::OnAcquisition),
    ];
}

/// Trauma definitions keyed by lowercase id.
#[derive(Debug, Clone)]
pub struct TraumaCatalog {
    definitions: HashMap<String, TraumaDefinition>,
}

impl Default for TraumaCatalog {
    fn default() -> Self {
        Self {
            definitions: DEFAULT_TRAUMAS
                .iter()
                .map(|d| (d.id.to_lowercase(), d.clone()))
                .collect(),
        }
    }
}

impl TraumaCatalog {
    pub fn from_definitions(defs: Vec<TraumaDefinition>) -> Result<Self, CatalogError> {
        let mut definitions = HashMap::with_capacity(defs.len());
        for def in defs {
            if def.id.trim().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            let key = def.id.to_lowercase();
            if definitions.contains_key(&key) {
                return Err(CatalogError::DuplicateId(def.id));
            }
            definitions.insert(key, def);
        }
        Ok(Self { definitions })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let defs: Vec<TraumaDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(defs)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, trauma_id: &str) -> Option<&TraumaDefinition> {
        self.definitions.get(&trauma_id.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraumaDefinition> {
        self.definitions.values()
    }
}
