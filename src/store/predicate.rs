//! Predicate combinators over store entries.

use crate::store::{DataKind, Entry};
use crate::types::{EntryId, PropertyValue};

/// Selection predicate evaluated against an [`Entry`].
///
/// Predicates are plain data so callers can build them once and hand them to
/// [`ObjectStore::query`](crate::store::ObjectStore::query).
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches everything
    Always,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Property `key` is present and equal to `value`
    PropertyEquals { key: String, value: PropertyValue },
    /// Property `key` is present (any value)
    HasProperty(String),
    /// At least one property key starts with the prefix
    HasPropertyPrefix(String),
    DataKindIs(DataKind),
    IdIs(EntryId),
}

impl Predicate {
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(predicates.into_iter().collect())
    }

    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(predicates.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn property_equals(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Predicate::PropertyEquals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn has_property(key: impl Into<String>) -> Self {
        Predicate::HasProperty(key.into())
    }

    pub fn has_property_prefix(prefix: impl Into<String>) -> Self {
        Predicate::HasPropertyPrefix(prefix.into())
    }

    pub fn kind_is(kind: DataKind) -> Self {
        Predicate::DataKindIs(kind)
    }

    /// Evaluate the predicate against an entry
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::And(all) => all.iter().all(|p| p.matches(entry)),
            // An empty OR matches nothing, mirroring an empty set of alternatives.
            Predicate::Or(any) => any.iter().any(|p| p.matches(entry)),
            Predicate::Not(inner) => !inner.matches(entry),
            Predicate::PropertyEquals { key, value } => entry.properties.get(key) == Some(value),
            Predicate::HasProperty(key) => entry.properties.contains_key(key),
            Predicate::HasPropertyPrefix(prefix) => entry
                .properties
                .range(prefix.clone()..)
                .next()
                .is_some_and(|(k, _)| k.starts_with(prefix.as_str())),
            Predicate::DataKindIs(kind) => entry.data.kind() == *kind,
            Predicate::IdIs(id) => entry.id == *id,
        }
    }
}
