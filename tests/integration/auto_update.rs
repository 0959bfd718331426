//! Auto-update: regeneration triggered by selection, parameter and store changes

use super::test_utils::*;
use statgen::{Entry, EntryData};

#[test]
fn test_auto_update_defaults_off() {
    let f = Fixture::new();
    let mut generator = f.generator();
    assert!(!generator.auto_update());
    let events = generator.subscribe();

    generator.set_image_nodes(vec![f.image]);
    generator.set_histogram_bins(10);
    generator.process_events().unwrap();

    assert!(drain(&events).is_empty());
    assert_eq!(generator.stats().dispatched, 0);
}

#[test]
fn test_selection_change_triggers_generation() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    let events = generator.subscribe();

    generator.set_image_nodes(vec![f.image]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    assert_eq!(
        names(&drain(&events)),
        vec!["generation_started", "new_data_available", "generation_finished"]
    );

    // Same selection again: nothing to do.
    generator.set_image_nodes(vec![f.image]);
    generator.run_until_idle(WAIT).unwrap();
    assert!(drain(&events).is_empty());

    generator.set_roi_nodes(vec![Some(f.mask)]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    assert_eq!(count(&drain(&events), "generation_started"), 1);
    assert_eq!(final_results(&f.store, f.image, Some(f.mask), 100).len(), 1);
}

#[test]
fn test_parameter_change_triggers_generation() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    drain(&events);

    generator.set_histogram_bins(100);
    generator.set_ignore_zero_voxel(false);
    generator.run_until_idle(WAIT).unwrap();
    assert!(drain(&events).is_empty());

    generator.set_histogram_bins(20);
    generator.wait_for_generation_finished(WAIT).unwrap();
    assert_eq!(count(&drain(&events), "new_data_available"), 1);
    assert_eq!(final_results(&f.store, f.image, None, 20).len(), 1);

    generator.set_ignore_zero_voxel(true);
    generator.wait_for_generation_finished(WAIT).unwrap();
    assert_eq!(count(&drain(&events), "new_data_available"), 1);
    assert_eq!(generator.stats().dispatched, 3);
}

#[test]
fn test_relevant_store_modification_triggers_generation() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(f.mask)]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    drain(&events);
    let first = final_results(&f.store, f.image, Some(f.mask), 100)[0].id;

    f.store.touch(f.mask).unwrap();
    generator.wait_for_generation_finished(WAIT).unwrap();

    assert_eq!(
        names(&drain(&events)),
        vec!["generation_started", "new_data_available", "generation_finished"]
    );
    let second = final_results(&f.store, f.image, Some(f.mask), 100);
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].id, first);
}

#[test]
fn test_irrelevant_store_changes_are_ignored() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    drain(&events);

    // Unselected image and an unrelated node
    f.store.touch(f.image2).unwrap();
    f.store.add(Entry::new("unrelated", EntryData::Empty));
    add_image(&f.store, "new image", 3.0);
    generator.run_until_idle(WAIT).unwrap();

    assert!(drain(&events).is_empty());
    assert_eq!(generator.stats().dispatched, 1);
}

#[test]
fn test_removing_selected_image() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image, f.image2]);
    generator.wait_for_generation_finished(WAIT).unwrap();
    drain(&events);

    f.store.remove(&[f.image2]);
    generator.run_until_idle(WAIT).unwrap();

    assert!(drain(&events).is_empty());
    assert_eq!(generator.stats().dispatched, 2);
}

#[test]
fn test_store_change_triggers_generation() {
    let f = Fixture::new();
    let mut generator = f.auto_updating_generator();
    generator.set_store(None);
    generator.set_image_nodes(vec![f.image]);
    generator.run_until_idle(WAIT).unwrap();
    assert_eq!(generator.stats().dispatched, 0);

    generator.set_store(Some(std::sync::Arc::clone(&f.store)));
    generator.wait_for_generation_finished(WAIT).unwrap();
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
}
