//! Store mutations from other threads while jobs are in flight

use super::test_utils::*;
use statgen::generation::query::find_latest;
use statgen::generation::ResultSchema;
use statgen::statistics::StatisticsParams;
use statgen::types::EntryId;
use statgen::{Entry, EntryData, ObjectStore};
use std::sync::Arc;
use std::thread;

fn churn_unrelated(store: &ObjectStore) {
    let extra: Vec<EntryId> = (0..20)
        .map(|i| store.add(Entry::new(format!("unrelated {i}"), EntryData::Empty)))
        .collect();
    store.remove(&extra[..10]);
    add_image(store, "late image", 5.0);
}

fn fresh_result(f: &Fixture, roi: Option<EntryId>) -> Option<Entry> {
    let source = f.store.get(f.image).unwrap();
    let roi = roi.map(|id| f.store.get(id).unwrap());
    find_latest(
        &f.store,
        &ResultSchema::image_statistics(),
        &source,
        roi.as_ref(),
        &StatisticsParams::default().to_parameter_set(),
        true,
        true,
    )
}

#[test]
fn test_source_touched_during_job_is_recomputed() {
    let f = Fixture::new();
    let gate = Gate::default();
    let mut generator = gated_generator(&f.store, vec![f.image], &gate);
    let events = generator.subscribe();

    assert!(!generator.generate().unwrap());
    assert_eq!(generator.in_flight_jobs(), 1);

    let mutator = {
        let store = Arc::clone(&f.store);
        let gate = gate.clone();
        let image = f.image;
        thread::spawn(move || {
            store.touch(image).unwrap();
            churn_unrelated(&store);
            gate.open();
        })
    };
    generator.wait_for_generation_finished(WAIT).unwrap();
    mutator.join().unwrap();

    // The first result predates the touch, so a second job replaced it.
    assert_eq!(generator.stats().dispatched, 2);
    assert_eq!(generator.stats().completed, 2);
    let results = final_results(&f.store, f.image, None, 100);
    assert_eq!(results.len(), 1);
    assert_eq!(fresh_result(&f, None).map(|e| e.id), Some(results[0].id));

    let events = drain(&events);
    assert_eq!(count(&events, "generation_started"), 2);
    assert_eq!(count(&events, "new_data_available"), 2);
    assert_eq!(count(&events, "generation_finished"), 1);
}

#[test]
fn test_unrelated_changes_during_job_keep_result() {
    let f = Fixture::new();
    let gate = Gate::default();
    let mut generator = gated_generator(&f.store, vec![f.image], &gate);

    generator.generate().unwrap();
    let mutator = {
        let store = Arc::clone(&f.store);
        let gate = gate.clone();
        let other = f.image2;
        thread::spawn(move || {
            store.touch(other).unwrap();
            churn_unrelated(&store);
            gate.open();
        })
    };
    generator.wait_for_generation_finished(WAIT).unwrap();
    mutator.join().unwrap();

    assert_eq!(generator.stats().dispatched, 1);
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
    assert!(fresh_result(&f, None).is_some());
}

#[test]
fn test_roi_touched_during_job_with_auto_update() {
    let f = Fixture::new();
    let gate = Gate::default();
    let mut generator = gated_generator(&f.store, vec![f.image], &gate);
    generator.set_auto_update(true);
    generator.update_strategy(|pairs| pairs.set_rois(vec![Some(f.mask), None]));
    assert_eq!(generator.in_flight_jobs(), 0);

    // Dispatch both pairs; both jobs wait for the gate.
    generator.process_events().unwrap();
    assert_eq!(generator.in_flight_jobs(), 2);

    let mutator = {
        let store = Arc::clone(&f.store);
        let gate = gate.clone();
        let mask = f.mask;
        thread::spawn(move || {
            store.touch(mask).unwrap();
            churn_unrelated(&store);
            gate.open();
        })
    };
    generator.wait_for_generation_finished(WAIT).unwrap();
    mutator.join().unwrap();

    // Only the masked pair depends on the touched ROI.
    assert_eq!(generator.stats().dispatched, 3);
    assert_eq!(final_results(&f.store, f.image, Some(f.mask), 100).len(), 1);
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
    assert!(fresh_result(&f, Some(f.mask)).is_some());
    assert!(fresh_result(&f, None).is_some());
}
