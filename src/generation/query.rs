//! Cache Query Service
//!
//! Pure functions that build the artifact predicate for a (source, ROI, parameters)
//! triple, pick the newest match, and purge obsolete duplicates.

use crate::generation::key::{CacheKey, GenerationStatus, ParameterSet, ResultSchema};
use crate::generation::GENERATION_STATUS_PROPERTY;
use crate::store::{Entry, ObjectStore, Predicate};
use crate::types::EntryId;
use tracing::debug;

/// Predicate matching every artifact cached for the given key, placeholders included
pub fn result_predicate(
    schema: &ResultSchema,
    source: EntryId,
    roi: Option<EntryId>,
    params: &ParameterSet,
) -> Predicate {
    let roi_predicate = match roi {
        Some(roi) => schema.roi_rule.sources_predicate_for(roi),
        None => Predicate::not(schema.roi_rule.any_relation_predicate()),
    };
    Predicate::and([
        Predicate::kind_is(schema.kind),
        schema.source_rule.sources_predicate_for(source),
        roi_predicate,
        params.predicate(),
    ])
}

/// Whether `artifact` is final and strictly newer than its inputs
pub fn is_fresh(artifact: &Entry, source: &Entry, roi: Option<&Entry>) -> bool {
    GenerationStatus::of(artifact).is_none()
        && artifact.modified > source.modified
        && roi.map_or(true, |roi| artifact.modified > roi.modified)
}

/// Newest entry in `candidates`; ties go to the earliest inserted entry.
fn newest(candidates: Vec<Entry>) -> Option<Entry> {
    candidates.into_iter().fold(None, |best, entry| match best {
        Some(b) if b.modified >= entry.modified => Some(b),
        _ => Some(entry),
    })
}

/// Find the latest cached artifact for `source`/`roi` computed with `params`.
///
/// With `exclude_placeholders` only final artifacts are considered. The newest match
/// is chosen first; `only_if_fresh` then rejects it unless it postdates its inputs.
pub fn find_latest(
    store: &ObjectStore,
    schema: &ResultSchema,
    source: &Entry,
    roi: Option<&Entry>,
    params: &ParameterSet,
    only_if_fresh: bool,
    exclude_placeholders: bool,
) -> Option<Entry> {
    let mut predicate = result_predicate(schema, source.id, roi.map(|r| r.id), params);
    if exclude_placeholders {
        predicate = Predicate::and([
            predicate,
            Predicate::not(Predicate::has_property(GENERATION_STATUS_PROPERTY)),
        ]);
    }

    let latest = newest(store.query(&predicate))?;
    if only_if_fresh && !is_fresh(&latest, source, roi) {
        return None;
    }
    Some(latest)
}

/// Remove every artifact cached for `key` except the entries in `keep`.
/// Returns the number of removed entries.
pub fn remove_obsolete(
    store: &ObjectStore,
    schema: &ResultSchema,
    key: &CacheKey,
    keep: &[EntryId],
) -> usize {
    let predicate = result_predicate(schema, key.source, key.roi, &key.params);
    let obsolete: Vec<EntryId> = store
        .query(&predicate)
        .into_iter()
        .map(|e| e.id)
        .filter(|id| !keep.contains(id))
        .collect();
    if obsolete.is_empty() {
        return 0;
    }
    let removed = store.remove(&obsolete);
    debug!(
        source = %key.source,
        roi = ?key.roi,
        removed,
        "Removed obsolete cached artifacts"
    );
    removed
}
