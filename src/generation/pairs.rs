//! Pair Enumeration Strategy
//!
//! Turns the current source and ROI selections into the working set of
//! (source, ROI-or-absent) pairs for a generation pass.

use crate::types::EntryId;

/// A (source, ROI) pair; `None` means "whole source"
pub type Pair = (EntryId, Option<EntryId>);

pub trait PairStrategy {
    /// Pairs for the next pass, in processing order
    fn pairs(&self) -> Vec<Pair>;

    /// Whether a change of `changed` can affect any pair
    fn is_relevant(&self, changed: EntryId) -> bool;
}

/// Cross product of sources and ROIs, or every source alone when no ROI is selected
pub fn enumerate_pairs(sources: &[EntryId], rois: &[Option<EntryId>]) -> Vec<Pair> {
    if rois.is_empty() {
        return sources.iter().map(|s| (*s, None)).collect();
    }
    sources
        .iter()
        .flat_map(|s| rois.iter().map(move |r| (*s, *r)))
        .collect()
}

/// Image/ROI selection used by the statistics generator.
///
/// A `None` inside the ROI selection adds the whole-image pair next to the ROI pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAndRoiPairs {
    images: Vec<EntryId>,
    rois: Vec<Option<EntryId>>,
}

impl ImageAndRoiPairs {
    pub fn new(images: Vec<EntryId>, rois: Vec<Option<EntryId>>) -> Self {
        Self { images, rois }
    }

    pub fn images(&self) -> &[EntryId] {
        &self.images
    }

    pub fn rois(&self) -> &[Option<EntryId>] {
        &self.rois
    }

    /// Replace the image selection. Returns whether it changed.
    pub fn set_images(&mut self, images: Vec<EntryId>) -> bool {
        if self.images == images {
            return false;
        }
        self.images = images;
        true
    }

    /// Replace the ROI selection. Returns whether it changed.
    pub fn set_rois(&mut self, rois: Vec<Option<EntryId>>) -> bool {
        if self.rois == rois {
            return false;
        }
        self.rois = rois;
        true
    }
}

impl PairStrategy for ImageAndRoiPairs {
    fn pairs(&self) -> Vec<Pair> {
        enumerate_pairs(&self.images, &self.rois)
    }

    fn is_relevant(&self, changed: EntryId) -> bool {
        self.images.contains(&changed) || self.rois.contains(&Some(changed))
    }
}
