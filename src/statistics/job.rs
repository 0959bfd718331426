//! Image statistics job and its factory.

use crate::error::GenerationError;
use crate::generation::{GenerationJob, JobFactory, ParameterSet, ResultSchema};
use crate::statistics::{
    Image, RoiInput, StatisticsCalculator, StatisticsContainer, StatisticsParams,
};
use crate::store::{Entry, EntryData};
use std::sync::Arc;

/// Computes statistics for one image, optionally restricted to an ROI
pub struct ImageStatisticsJob {
    image: Arc<Image>,
    roi: Option<RoiInput>,
    params: StatisticsParams,
    label: String,
    results: Vec<EntryData>,
    error: Option<String>,
}

impl ImageStatisticsJob {
    pub fn new(
        image: Arc<Image>,
        roi: Option<RoiInput>,
        params: StatisticsParams,
        label: impl Into<String>,
    ) -> Self {
        Self {
            image,
            roi,
            params,
            label: label.into(),
            results: Vec::new(),
            error: None,
        }
    }

    pub fn params(&self) -> &StatisticsParams {
        &self.params
    }
}

impl GenerationJob for ImageStatisticsJob {
    fn description(&self) -> String {
        format!(
            "statistics for {} ({} bins, ignore zero: {})",
            self.label, self.params.histogram_bins, self.params.ignore_zero_voxel
        )
    }

    fn run(&mut self) -> bool {
        let calculator = StatisticsCalculator::new(self.params);
        match calculator.compute(&self.image, self.roi.as_ref()) {
            Ok(statistics) => {
                self.results = vec![EntryData::Statistics(Arc::new(statistics))];
                self.error = None;
                true
            }
            Err(e) => {
                self.results.clear();
                self.error = Some(e.to_string());
                false
            }
        }
    }

    fn take_results(&mut self) -> Vec<EntryData> {
        std::mem::take(&mut self.results)
    }

    fn last_error_message(&self) -> Option<String> {
        self.error.clone()
    }
}

/// Builds [`ImageStatisticsJob`]s from the current statistics parameters
#[derive(Debug, Clone, Default)]
pub struct ImageStatisticsJobFactory {
    params: StatisticsParams,
}

impl ImageStatisticsJobFactory {
    pub fn new(params: StatisticsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StatisticsParams {
        &self.params
    }

    /// Returns whether the parameters changed
    pub fn set_params(&mut self, params: StatisticsParams) -> bool {
        if self.params == params {
            return false;
        }
        self.params = params;
        true
    }
}

impl JobFactory for ImageStatisticsJobFactory {
    fn schema(&self) -> ResultSchema {
        ResultSchema::image_statistics()
    }

    fn parameters(&self) -> ParameterSet {
        self.params.to_parameter_set()
    }

    fn create_job(
        &self,
        source: &Entry,
        roi: Option<&Entry>,
    ) -> Result<Box<dyn GenerationJob>, GenerationError> {
        let EntryData::Image(image) = &source.data else {
            return Err(GenerationError::InvalidSource {
                id: source.id,
                reason: format!("expected an image, found {:?}", source.kind()),
            });
        };

        // Unsupported ROI kinds are accepted here and fail inside the job, so they
        // surface as job errors like any other computation failure.
        let roi_input = roi.map(|roi| match &roi.data {
            EntryData::Mask(mask) => RoiInput::Mask(Arc::clone(mask)),
            EntryData::PlanarFigure(figure) => RoiInput::Figure(Arc::clone(figure)),
            other => RoiInput::Unsupported(other.kind()),
        });

        let label = match roi {
            Some(roi) => format!("{} in {}", source.name, roi.name),
            None => source.name.clone(),
        };
        Ok(Box::new(ImageStatisticsJob::new(
            Arc::clone(image),
            roi_input,
            self.params,
            label,
        )))
    }

    fn placeholder_data(&self) -> EntryData {
        EntryData::Statistics(Arc::new(StatisticsContainer::default()))
    }

    fn artifact_name(&self, source: &Entry, roi: Option<&Entry>) -> String {
        match roi {
            Some(roi) => format!("{} - {} statistics", source.name, roi.name),
            None => format!("{} statistics", source.name),
        }
    }
}
