//! Failure handling: failing jobs, invalid inputs and a missing store

use super::test_utils::*;
use statgen::generation::{GenerationStatus, GeneratorEvent, GENERATION_STATUS_PROPERTY};
use statgen::statistics::{MaskImage, PlanarFigure, StatisticsContainer};
use statgen::store::Predicate;
use statgen::types::EntryId;
use statgen::{Entry, EntryData, GenerationError};
use std::sync::Arc;

fn in_progress_placeholders(f: &Fixture) -> Vec<Entry> {
    f.store.query(&Predicate::property_equals(
        GENERATION_STATUS_PROPERTY,
        GenerationStatus::WorkInProgress.as_str(),
    ))
}

fn add_wrong_size_mask(f: &Fixture) -> EntryId {
    f.store.add(Entry::new(
        "small mask",
        EntryData::Mask(Arc::new(MaskImage::from_fn([1, 1, 1], |_, _, _| true))),
    ))
}

#[test]
fn test_bad_roi_data_reports_job_error() {
    let f = Fixture::new();
    let wrong_size = add_wrong_size_mask(&f);
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(wrong_size)]);

    assert!(!generator.generate().unwrap());
    generator.run_until_idle(WAIT).unwrap();

    let events = drain(&events);
    assert_eq!(names(&events), vec!["generation_started", "job_error"]);
    match (&events[0], &events[1]) {
        (
            GeneratorEvent::GenerationStarted { job: started, .. },
            GeneratorEvent::JobError { message, job },
        ) => {
            assert_eq!(started, job);
            assert!(message.contains("do not match"), "{}", message);
        }
        other => panic!("unexpected events {:?}", other),
    }
    assert_eq!(generator.stats().failed, 1);
    assert!(generator.is_work_in_progress());
}

#[test]
fn test_figure_outside_image_reports_job_error() {
    let f = Fixture::new();
    let figure = f.store.add(Entry::new(
        "far figure",
        EntryData::PlanarFigure(Arc::new(PlanarFigure::rectangle(9, 0.0, 0.0, 1.0, 1.0))),
    ));
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(figure)]);

    generator.generate().unwrap();
    generator.run_until_idle(WAIT).unwrap();

    assert_eq!(count(&drain(&events), "job_error"), 1);
    assert!(final_results(&f.store, f.image, Some(figure), 100).is_empty());
}

#[test]
fn test_unsupported_roi_reports_job_error() {
    let f = Fixture::new();
    let label = f.store.add(Entry::new("label", EntryData::Empty));
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(label), Some(f.mask), None]);

    assert!(!generator.generate().unwrap());
    generator.run_until_idle(WAIT).unwrap();

    let events = drain(&events);
    assert_eq!(count(&events, "generation_started"), 3);
    let errors: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            GeneratorEvent::JobError { message, .. } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Unsupported ROI"), "{}", errors[0]);

    assert_eq!(final_results(&f.store, f.image, Some(f.mask), 100).len(), 1);
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
    assert_eq!(generator.stats().failed, 1);

    // Later passes neither fail nor redispatch the stuck pair.
    assert!(!generator.generate().unwrap());
    generator.run_until_idle(WAIT).unwrap();
    assert_eq!(generator.stats().dispatched, 3);
}

#[test]
fn test_unrelatable_roi_does_not_abort_pass() {
    let f = Fixture::new();
    let not_a_roi = f.store.add(Entry::new(
        "foreign statistics",
        EntryData::Statistics(Arc::new(StatisticsContainer::default())),
    ));
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image, f.image2]);
    generator.set_roi_nodes(vec![Some(not_a_roi), None]);

    assert!(!generator.generate().unwrap());
    generator.run_until_idle(WAIT).unwrap();
    assert!(!generator.generate().unwrap());
    generator.run_until_idle(WAIT).unwrap();

    // One error per (image, ROI) key, reported once; whole-image pairs complete.
    let events = drain(&events);
    assert_eq!(count(&events, "job_error"), 2);
    assert_eq!(count(&events, "generation_started"), 2);
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
    assert_eq!(final_results(&f.store, f.image2, None, 100).len(), 1);
    assert!(final_results(&f.store, f.image, Some(not_a_roi), 100).is_empty());
}

#[test]
fn test_oversized_histogram_reports_job_error() {
    let f = Fixture::new();
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_histogram_bins(u32::MAX);

    generator.generate().unwrap();
    generator.run_until_idle(WAIT).unwrap();

    let events = drain(&events);
    assert_eq!(names(&events), vec!["generation_started", "job_error"]);
    assert_eq!(generator.stats().failed, 1);
}

#[test]
fn test_failed_placeholder_blocks_redispatch() {
    let f = Fixture::new();
    let wrong_size = add_wrong_size_mask(&f);
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(wrong_size)]);

    generator.generate().unwrap();
    generator.run_until_idle(WAIT).unwrap();
    assert_eq!(in_progress_placeholders(&f).len(), 1);

    for _ in 0..3 {
        assert!(!generator.generate().unwrap());
        generator.run_until_idle(WAIT).unwrap();
    }
    assert_eq!(generator.stats().dispatched, 1);
    assert_eq!(count(&drain(&events), "job_error"), 1);
    assert_eq!(in_progress_placeholders(&f).len(), 1);

    // Waiting for a finish that cannot happen times out.
    assert!(matches!(
        generator.wait_for_generation_finished(std::time::Duration::from_millis(50)),
        Err(GenerationError::Timeout(_))
    ));

    // Removing the stuck placeholder lets the key be retried.
    let stuck: Vec<_> = in_progress_placeholders(&f).iter().map(|e| e.id).collect();
    f.store.remove(&stuck);
    generator.generate().unwrap();
    generator.run_until_idle(WAIT).unwrap();
    assert_eq!(generator.stats().dispatched, 2);
}

#[test]
fn test_failures_do_not_block_other_pairs() {
    let f = Fixture::new();
    let wrong_size = add_wrong_size_mask(&f);
    let mut generator = f.generator();
    generator.set_image_nodes(vec![f.image]);
    generator.set_roi_nodes(vec![Some(wrong_size), Some(f.mask), None]);

    generator.generate().unwrap();
    generator.run_until_idle(WAIT).unwrap();

    assert_eq!(final_results(&f.store, f.image, Some(f.mask), 100).len(), 1);
    assert_eq!(final_results(&f.store, f.image, None, 100).len(), 1);
    let stats = generator.stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
}

#[test]
fn test_invalid_source_fails_fast() {
    let f = Fixture::new();
    let mut generator = f.generator();
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.mask]);

    assert!(matches!(
        generator.generate(),
        Err(GenerationError::InvalidSource { id, .. }) if id == f.mask
    ));
    assert!(drain(&events).is_empty());
    assert!(all_statistics(&f.store).is_empty());
}

#[test]
fn test_generate_without_store() {
    let f = Fixture::new();
    let mut generator = f.generator();
    generator.set_store(None);
    let events = generator.subscribe();
    generator.set_image_nodes(vec![f.image]);

    assert!(matches!(generator.generate(), Err(GenerationError::StoreNotSet)));
    assert!(drain(&events).is_empty());
}
