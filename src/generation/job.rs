//! Computation jobs and the factory seam the generator builds them through.

use crate::error::GenerationError;
use crate::generation::key::{ParameterSet, ResultSchema};
use crate::store::{Entry, EntryData};

/// A unit of work computing derived artifacts for one (source, ROI) pair.
///
/// Jobs run on a worker thread and never touch the object store: they only fill
/// their own result slots, which the generator applies on the owner thread.
pub trait GenerationJob: Send {
    /// Short human-readable description for logs
    fn description(&self) -> String;

    /// Execute the computation. Returns `true` on success, in which case
    /// [`take_results`](Self::take_results) yields the produced artifacts.
    /// Failures are reported through [`last_error_message`](Self::last_error_message).
    fn run(&mut self) -> bool;

    fn take_results(&mut self) -> Vec<EntryData>;

    fn last_error_message(&self) -> Option<String>;
}

/// Specialization hook: what a generator computes and how its artifacts look
pub trait JobFactory {
    fn schema(&self) -> ResultSchema;

    /// Current parameter set; part of every cache key
    fn parameters(&self) -> ParameterSet;

    /// Build a job for the pair. Invalid inputs are rejected here, before scheduling.
    fn create_job(
        &self,
        source: &Entry,
        roi: Option<&Entry>,
    ) -> Result<Box<dyn GenerationJob>, GenerationError>;

    /// Payload stored in placeholder artifacts
    fn placeholder_data(&self) -> EntryData;

    /// Display name for artifacts of this pair
    fn artifact_name(&self, source: &Entry, roi: Option<&Entry>) -> String {
        match roi {
            Some(roi) => format!("{} - {} result", source.name, roi.name),
            None => format!("{} result", source.name),
        }
    }
}
