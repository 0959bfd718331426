//! Cached derived-data generation
//!
//! Cache keys and queries over the object store, the job and pair-strategy seams,
//! the worker pool and the generator that ties them together.

pub mod events;
pub mod generator;
pub mod job;
pub mod key;
pub mod pairs;
pub(crate) mod pool;
pub mod query;

pub use events::{GeneratorEvent, GeneratorEventBus};
pub use generator::{Generator, GeneratorStats};
pub use job::{GenerationJob, JobFactory};
pub use key::{CacheKey, GenerationStatus, ParameterSet, ResultSchema, GENERATION_STATUS_PROPERTY};
pub use pairs::{enumerate_pairs, ImageAndRoiPairs, Pair, PairStrategy};
