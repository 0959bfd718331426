//! Statgen: Cached Derived-Data Generation
//!
//! A generation engine that keeps derived artifacts (image statistics) in an object
//! store next to the data they are computed from. Artifacts are cached per
//! (source, ROI, parameters), recomputed on worker threads when their inputs change,
//! and tracked through placeholders while computation is in flight.

pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod relation;
pub mod statistics;
pub mod store;
pub mod types;

pub use error::{GenerationError, StatisticsError, StoreError};
pub use generation::{Generator, GeneratorEvent};
pub use statistics::ImageStatisticsGenerator;
pub use store::{Entry, EntryData, ObjectStore};
