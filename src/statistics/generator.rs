//! Image statistics generator: the generic generator over image/ROI pairs with
//! statistics jobs, plus the parameter and selection accessors callers work with.

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::generation::{Generator, ImageAndRoiPairs};
use crate::statistics::{ImageStatisticsJobFactory, StatisticsParams};
use crate::store::ObjectStore;
use crate::types::EntryId;
use std::sync::Arc;

pub type ImageStatisticsGenerator = Generator<ImageAndRoiPairs, ImageStatisticsJobFactory>;

impl Generator<ImageAndRoiPairs, ImageStatisticsJobFactory> {
    /// Statistics generator with parameters and auto-update taken from `config`
    pub fn with_store(
        store: Option<Arc<ObjectStore>>,
        config: &GeneratorConfig,
    ) -> Result<Self, GenerationError> {
        let params = StatisticsParams {
            histogram_bins: config.histogram_bins,
            ignore_zero_voxel: config.ignore_zero_voxel,
        };
        Generator::new(
            store,
            ImageAndRoiPairs::default(),
            ImageStatisticsJobFactory::new(params),
            config,
        )
    }

    pub fn histogram_bins(&self) -> u32 {
        self.factory().params().histogram_bins
    }

    pub fn set_histogram_bins(&mut self, bins: u32) {
        self.update_factory(|factory| {
            let params = StatisticsParams {
                histogram_bins: bins,
                ..*factory.params()
            };
            factory.set_params(params)
        });
    }

    pub fn ignore_zero_voxel(&self) -> bool {
        self.factory().params().ignore_zero_voxel
    }

    pub fn set_ignore_zero_voxel(&mut self, ignore: bool) {
        self.update_factory(|factory| {
            let params = StatisticsParams {
                ignore_zero_voxel: ignore,
                ..*factory.params()
            };
            factory.set_params(params)
        });
    }

    pub fn image_nodes(&self) -> &[EntryId] {
        self.strategy().images()
    }

    pub fn set_image_nodes(&mut self, images: Vec<EntryId>) {
        self.update_strategy(|pairs| pairs.set_images(images));
    }

    /// ROI selection; `None` requests whole-image statistics next to the ROI ones
    pub fn roi_nodes(&self) -> &[Option<EntryId>] {
        self.strategy().rois()
    }

    pub fn set_roi_nodes(&mut self, rois: Vec<Option<EntryId>>) {
        self.update_strategy(|pairs| pairs.set_rois(rois));
    }
}
