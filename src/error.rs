//! Error types for the statistics generation engine.

use crate::store::DataKind;
use crate::types::EntryId;
use thiserror::Error;

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Relation rule '{rule}' does not accept {kind:?} as {role}")]
    RelationKindMismatch {
        rule: &'static str,
        role: &'static str,
        kind: DataKind,
    },
}

/// Failures of the statistics computation itself
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatisticsError {
    #[error("Histogram bin count must be between 1 and {max}, got {bins}")]
    InvalidBinCount { bins: u32, max: u32 },

    #[error("Expected {expected} voxels for the given dimensions, got {actual}")]
    VoxelCountMismatch { expected: usize, actual: usize },

    #[error("Mask dimensions {mask:?} do not match image dimensions {image:?}")]
    DimensionMismatch {
        image: [usize; 3],
        mask: [usize; 3],
    },

    #[error("Unsupported ROI type: {0:?}")]
    UnsupportedRoi(DataKind),

    #[error("Planar figure is invalid: {0}")]
    InvalidFigure(String),

    #[error("Region of interest contains no voxels")]
    EmptyRegion,
}

/// Generator-level errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No object store is set on the generator")]
    StoreNotSet,

    #[error("Invalid source entry {id}: {reason}")]
    InvalidSource { id: EntryId, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out after {0:?} waiting for generation")]
    Timeout(std::time::Duration),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for GenerationError {
    fn from(err: config::ConfigError) -> Self {
        GenerationError::Config(err.to_string())
    }
}
