//! Relation Rules
//!
//! Provenance links between a derived artifact (the relation *source*) and the entries
//! it was computed from (the relation *destinations*). A link is recorded as a property
//! on the artifact, `relation.<rule id>.<destination id>`, so relations travel with
//! the artifact and can be matched by ordinary store predicates.

use crate::error::StoreError;
use crate::store::{DataKind, Entry, Predicate};
use crate::types::{EntryId, PropertyValue};

const RELATION_PROPERTY_PREFIX: &str = "relation.";

/// A named, kind-constrained provenance relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationRule {
    id: &'static str,
    source_kinds: &'static [DataKind],
    destination_kinds: &'static [DataKind],
}

impl RelationRule {
    pub const fn new(
        id: &'static str,
        source_kinds: &'static [DataKind],
        destination_kinds: &'static [DataKind],
    ) -> Self {
        Self {
            id,
            source_kinds,
            destination_kinds,
        }
    }

    /// Statistics computed from an image
    pub const fn statistics_to_image() -> Self {
        Self::new(
            "statistics_to_image",
            &[DataKind::Statistics],
            &[DataKind::Image],
        )
    }

    /// Statistics restricted to a region of interest.
    ///
    /// Any non-statistics entry can be selected as the ROI; whether its payload can
    /// actually restrict a computation is up to the job.
    pub const fn statistics_to_mask() -> Self {
        Self::new(
            "statistics_to_mask",
            &[DataKind::Statistics],
            &[
                DataKind::Mask,
                DataKind::PlanarFigure,
                DataKind::Image,
                DataKind::Empty,
            ],
        )
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn is_source_candidate(&self, entry: &Entry) -> bool {
        self.source_kinds.contains(&entry.kind())
    }

    pub fn is_destination_candidate(&self, entry: &Entry) -> bool {
        self.destination_kinds.contains(&entry.kind())
    }

    fn key_prefix(&self) -> String {
        format!("{}{}.", RELATION_PROPERTY_PREFIX, self.id)
    }

    fn property_key(&self, destination: EntryId) -> String {
        format!("{}{}", self.key_prefix(), destination.as_u64())
    }

    /// Record that `artifact` was derived from `destination`
    pub fn connect(&self, artifact: &mut Entry, destination: &Entry) -> Result<(), StoreError> {
        if !self.is_source_candidate(artifact) {
            return Err(StoreError::RelationKindMismatch {
                rule: self.id,
                role: "source",
                kind: artifact.kind(),
            });
        }
        if !self.is_destination_candidate(destination) {
            return Err(StoreError::RelationKindMismatch {
                rule: self.id,
                role: "destination",
                kind: destination.kind(),
            });
        }
        artifact.properties.insert(
            self.property_key(destination.id),
            PropertyValue::UInt(destination.id.as_u64()),
        );
        Ok(())
    }

    pub fn has_relation(&self, artifact: &Entry, destination: &Entry) -> bool {
        self.is_source_candidate(artifact)
            && artifact
                .properties
                .contains_key(&self.property_key(destination.id))
    }

    /// Ids of every entry `artifact` is related to under this rule
    pub fn related_destinations(&self, artifact: &Entry) -> Vec<EntryId> {
        let prefix = self.key_prefix();
        artifact
            .properties
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(prefix.as_str()))
            .filter_map(|(_, v)| v.as_u64())
            .map(EntryId::from_raw)
            .collect()
    }

    /// Predicate matching artifacts related to `destination`
    pub fn sources_predicate_for(&self, destination: EntryId) -> Predicate {
        Predicate::and([
            Predicate::or(self.source_kinds.iter().map(|k| Predicate::kind_is(*k))),
            Predicate::has_property(self.property_key(destination)),
        ])
    }

    /// Predicate matching the entries `artifact` is related to
    pub fn destinations_predicate_for(&self, artifact: &Entry) -> Predicate {
        Predicate::or(
            self.related_destinations(artifact)
                .into_iter()
                .map(Predicate::IdIs),
        )
    }

    /// Predicate matching artifacts with at least one relation under this rule
    pub fn any_relation_predicate(&self) -> Predicate {
        Predicate::has_property_prefix(self.key_prefix())
    }
}
