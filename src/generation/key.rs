//! Cache keys, parameter sets and generation status tags.

use crate::relation::RelationRule;
use crate::store::{DataKind, Entry, Predicate};
use crate::types::{EntryId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property holding the placeholder status. Its absence marks a final artifact.
pub const GENERATION_STATUS_PROPERTY: &str = "generation.status";

/// Status of a placeholder artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationStatus {
    Pending,
    WorkInProgress,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::WorkInProgress => "workInProgress",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(GenerationStatus::Pending),
            "workInProgress" => Some(GenerationStatus::WorkInProgress),
            _ => None,
        }
    }

    /// Status tag of an entry; `None` means the entry is final
    pub fn of(entry: &Entry) -> Option<Self> {
        entry
            .property(GENERATION_STATUS_PROPERTY)
            .and_then(PropertyValue::as_str)
            .and_then(Self::parse)
    }
}

/// Computation options re-encoded as stored properties. Equality is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterSet(BTreeMap<String, PropertyValue>);

impl ParameterSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every parameter onto the entry's properties
    pub fn apply_to(&self, entry: &mut Entry) {
        for (key, value) in &self.0 {
            entry.properties.insert(key.clone(), value.clone());
        }
    }

    /// Predicate requiring every parameter property to be present with an equal value
    pub fn predicate(&self) -> Predicate {
        Predicate::and(
            self.0
                .iter()
                .map(|(k, v)| Predicate::property_equals(k.clone(), v.clone())),
        )
    }
}

/// Identity of one cacheable computation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: EntryId,
    pub roi: Option<EntryId>,
    pub params: ParameterSet,
}

impl CacheKey {
    pub fn new(source: EntryId, roi: Option<EntryId>, params: ParameterSet) -> Self {
        Self {
            source,
            roi,
            params,
        }
    }
}

/// Shape of the artifacts a generator produces: their data kind and the relation
/// rules linking them to their source and ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSchema {
    pub kind: DataKind,
    pub source_rule: RelationRule,
    pub roi_rule: RelationRule,
}

impl ResultSchema {
    pub fn image_statistics() -> Self {
        Self {
            kind: DataKind::Statistics,
            source_rule: RelationRule::statistics_to_image(),
            roi_rule: RelationRule::statistics_to_mask(),
        }
    }
}
