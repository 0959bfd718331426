//! Statistics calculation over an image, optionally restricted to a region of interest.

use crate::error::StatisticsError;
use crate::statistics::{
    voxel_index, Histogram, Image, MaskImage, PlanarFigure, StatisticsContainer, StatisticsParams,
    MAX_HISTOGRAM_BINS,
};
use crate::store::DataKind;
use std::sync::Arc;

/// Region of interest handed to the calculator
#[derive(Debug, Clone)]
pub enum RoiInput {
    Mask(Arc<MaskImage>),
    Figure(Arc<PlanarFigure>),
    /// An ROI entry whose payload cannot restrict a computation
    Unsupported(DataKind),
}

/// Computes [`StatisticsContainer`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticsCalculator {
    params: StatisticsParams,
}

impl StatisticsCalculator {
    pub fn new(params: StatisticsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StatisticsParams {
        &self.params
    }

    pub fn compute(
        &self,
        image: &Image,
        roi: Option<&RoiInput>,
    ) -> Result<StatisticsContainer, StatisticsError> {
        let bins = self.params.histogram_bins;
        if bins == 0 || bins > MAX_HISTOGRAM_BINS {
            return Err(StatisticsError::InvalidBinCount {
                bins,
                max: MAX_HISTOGRAM_BINS,
            });
        }

        let values = self.collect_values(image, roi)?;
        if values.is_empty() {
            return Err(StatisticsError::EmptyRegion);
        }

        let count = values.len() as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in &values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / count;
        // population variance
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;

        Ok(StatisticsContainer {
            voxel_count: values.len() as u64,
            min,
            max,
            sum,
            mean,
            variance,
            std_dev: variance.sqrt(),
            histogram: self.histogram(&values, min, max),
        })
    }

    fn collect_values(
        &self,
        image: &Image,
        roi: Option<&RoiInput>,
    ) -> Result<Vec<f64>, StatisticsError> {
        let dims = image.dimensions();
        let keep = |v: f64| !(self.params.ignore_zero_voxel && v == 0.0);

        match roi {
            None => Ok(image.voxels().iter().copied().filter(|v| keep(*v)).collect()),
            Some(RoiInput::Mask(mask)) => {
                if mask.dimensions() != dims {
                    return Err(StatisticsError::DimensionMismatch {
                        image: dims,
                        mask: mask.dimensions(),
                    });
                }
                Ok(image
                    .voxels()
                    .iter()
                    .zip(mask.voxels())
                    .filter(|(_, inside)| **inside)
                    .map(|(v, _)| *v)
                    .filter(|v| keep(*v))
                    .collect())
            }
            Some(RoiInput::Figure(figure)) => {
                let z = figure.slice();
                if z >= dims[2] {
                    return Err(StatisticsError::InvalidFigure(format!(
                        "slice {} outside image with {} slices",
                        z, dims[2]
                    )));
                }
                let mut values = Vec::new();
                for y in 0..dims[1] {
                    for x in 0..dims[0] {
                        if figure.contains(x as f64, y as f64) {
                            let v = image.voxels()[voxel_index(dims, x, y, z)];
                            if keep(v) {
                                values.push(v);
                            }
                        }
                    }
                }
                Ok(values)
            }
            Some(RoiInput::Unsupported(kind)) => Err(StatisticsError::UnsupportedRoi(*kind)),
        }
    }

    fn histogram(&self, values: &[f64], min: f64, max: f64) -> Histogram {
        let bins = self.params.histogram_bins as usize;
        let range = max - min;
        let bin_width = if range > 0.0 { range / bins as f64 } else { 1.0 };
        let mut counts = vec![0u64; bins];
        for &v in values {
            let index = (((v - min) / bin_width).floor() as usize).min(bins - 1);
            counts[index] += 1;
        }
        Histogram {
            lower_bound: min,
            bin_width,
            counts,
        }
    }
}
