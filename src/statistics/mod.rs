//! Image Statistics
//!
//! Data types for the statistics domain (images, ROI masks, planar figures and the
//! statistics container), the calculator, and the job/factory pair that plugs the
//! calculation into the generation engine.

pub mod calculator;
pub mod generator;
pub mod job;

pub use calculator::{RoiInput, StatisticsCalculator};
pub use generator::ImageStatisticsGenerator;
pub use job::{ImageStatisticsJob, ImageStatisticsJobFactory};

use crate::error::StatisticsError;
use crate::generation::ParameterSet;
use serde::{Deserialize, Serialize};

/// Property key carrying the histogram bin count of a statistics artifact
pub const HISTOGRAM_BINS_PROPERTY: &str = "histogram_bins";
/// Property key carrying the zero-voxel exclusion flag of a statistics artifact
pub const IGNORE_ZERO_VOXEL_PROPERTY: &str = "ignore_zero_voxel";

/// Upper bound on histogram bins; the histogram is allocated up front
pub const MAX_HISTOGRAM_BINS: u32 = 1 << 20;

fn voxel_total(dimensions: [usize; 3]) -> usize {
    dimensions.iter().product()
}

/// Linear voxel index, x fastest
pub(crate) fn voxel_index(dimensions: [usize; 3], x: usize, y: usize, z: usize) -> usize {
    x + y * dimensions[0] + z * dimensions[0] * dimensions[1]
}

/// Scalar 3D image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    dimensions: [usize; 3],
    voxels: Vec<f64>,
}

impl Image {
    pub fn new(dimensions: [usize; 3], voxels: Vec<f64>) -> Result<Self, StatisticsError> {
        let expected = voxel_total(dimensions);
        if voxels.len() != expected {
            return Err(StatisticsError::VoxelCountMismatch {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self { dimensions, voxels })
    }

    /// Build an image by evaluating `f(x, y, z)` for every voxel
    pub fn from_fn(dimensions: [usize; 3], f: impl Fn(usize, usize, usize) -> f64) -> Self {
        let mut voxels = Vec::with_capacity(voxel_total(dimensions));
        for z in 0..dimensions[2] {
            for y in 0..dimensions[1] {
                for x in 0..dimensions[0] {
                    voxels.push(f(x, y, z));
                }
            }
        }
        Self { dimensions, voxels }
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn voxels(&self) -> &[f64] {
        &self.voxels
    }

    pub fn value_at(&self, x: usize, y: usize, z: usize) -> f64 {
        self.voxels[voxel_index(self.dimensions, x, y, z)]
    }
}

/// Binary mask on the same voxel grid as an image
#[derive(Debug, Clone, PartialEq)]
pub struct MaskImage {
    dimensions: [usize; 3],
    voxels: Vec<bool>,
}

impl MaskImage {
    pub fn new(dimensions: [usize; 3], voxels: Vec<bool>) -> Result<Self, StatisticsError> {
        let expected = voxel_total(dimensions);
        if voxels.len() != expected {
            return Err(StatisticsError::VoxelCountMismatch {
                expected,
                actual: voxels.len(),
            });
        }
        Ok(Self { dimensions, voxels })
    }

    pub fn from_fn(dimensions: [usize; 3], f: impl Fn(usize, usize, usize) -> bool) -> Self {
        let mut voxels = Vec::with_capacity(voxel_total(dimensions));
        for z in 0..dimensions[2] {
            for y in 0..dimensions[1] {
                for x in 0..dimensions[0] {
                    voxels.push(f(x, y, z));
                }
            }
        }
        Self { dimensions, voxels }
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn voxels(&self) -> &[bool] {
        &self.voxels
    }
}

/// Closed polygon outline drawn on one axial slice, in voxel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarFigure {
    slice: usize,
    points: Vec<[f64; 2]>,
}

impl PlanarFigure {
    pub fn new(slice: usize, points: Vec<[f64; 2]>) -> Result<Self, StatisticsError> {
        if points.len() < 3 {
            return Err(StatisticsError::InvalidFigure(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        Ok(Self { slice, points })
    }

    /// Axis-aligned rectangle spanning `[x0, x1] x [y0, y1]`
    pub fn rectangle(slice: usize, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            slice,
            points: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
        }
    }

    pub fn slice(&self) -> usize {
        self.slice
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Even-odd point-in-polygon test
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.points.len();
        let mut j = n - 1;
        for i in 0..n {
            let [xi, yi] = self.points[i];
            let [xj, yj] = self.points[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Histogram with equally wide bins starting at `lower_bound`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub lower_bound: f64,
    pub bin_width: f64,
    pub counts: Vec<u64>,
}

/// Computed statistics for one image/ROI combination.
///
/// A container with `voxel_count == 0` is an empty stand-in used by placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsContainer {
    pub voxel_count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub histogram: Histogram,
}

impl StatisticsContainer {
    pub fn is_empty(&self) -> bool {
        self.voxel_count == 0
    }
}

/// Computation options for image statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatisticsParams {
    pub histogram_bins: u32,
    pub ignore_zero_voxel: bool,
}

impl Default for StatisticsParams {
    fn default() -> Self {
        Self {
            histogram_bins: 100,
            ignore_zero_voxel: false,
        }
    }
}

impl StatisticsParams {
    /// Encode as stored properties
    pub fn to_parameter_set(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        params.insert(HISTOGRAM_BINS_PROPERTY, self.histogram_bins);
        params.insert(IGNORE_ZERO_VOXEL_PROPERTY, self.ignore_zero_voxel);
        params
    }
}
