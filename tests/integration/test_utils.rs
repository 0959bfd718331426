//! Shared test utilities for integration tests
//!
//! Builds stores with synthetic images and ROIs, creates generators over them and
//! inspects the cached statistics they leave behind.

use statgen::config::GeneratorConfig;
use statgen::generation::{
    GenerationJob, Generator, GeneratorEvent, ImageAndRoiPairs, JobFactory, ParameterSet,
    ResultSchema, GENERATION_STATUS_PROPERTY,
};
use statgen::statistics::{
    Image, ImageStatisticsJobFactory, MaskImage, PlanarFigure, StatisticsContainer,
};
use statgen::store::{DataKind, Predicate};
use statgen::types::EntryId;
use statgen::{Entry, EntryData, GenerationError, ImageStatisticsGenerator, ObjectStore};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

pub const WAIT: Duration = Duration::from_secs(20);

pub const DIMS: [usize; 3] = [4, 4, 2];

/// Store holding two images, a mask and a planar figure
pub struct Fixture {
    pub store: Arc<ObjectStore>,
    pub image: EntryId,
    pub image2: EntryId,
    pub mask: EntryId,
    pub figure: EntryId,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(ObjectStore::new());
        let image = add_image(&store, "image", 1.0);
        let image2 = add_image(&store, "image 2", 2.0);
        let mask = store.add(Entry::new(
            "mask",
            EntryData::Mask(Arc::new(MaskImage::from_fn(DIMS, |x, _, _| x < 2))),
        ));
        let figure = store.add(Entry::new(
            "figure",
            EntryData::PlanarFigure(Arc::new(PlanarFigure::rectangle(0, -0.5, -0.5, 1.5, 1.5))),
        ));
        Self {
            store,
            image,
            image2,
            mask,
            figure,
        }
    }

    pub fn generator(&self) -> ImageStatisticsGenerator {
        self.generator_with(&GeneratorConfig::default())
    }

    pub fn generator_with(&self, config: &GeneratorConfig) -> ImageStatisticsGenerator {
        ImageStatisticsGenerator::with_store(Some(Arc::clone(&self.store)), config).unwrap()
    }

    pub fn auto_updating_generator(&self) -> ImageStatisticsGenerator {
        self.generator_with(&GeneratorConfig {
            auto_update: true,
            ..GeneratorConfig::default()
        })
    }
}

/// Latch that holds gated jobs in `run` until opened
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (open, cond) = &*self.0;
        *open.lock().unwrap() = true;
        cond.notify_all();
    }

    fn wait(&self) {
        let (open, cond) = &*self.0;
        let mut guard = open.lock().unwrap();
        while !*guard {
            guard = cond.wait(guard).unwrap();
        }
    }
}

/// Statistics job that waits for its gate before computing
struct GatedJob {
    inner: Box<dyn GenerationJob>,
    gate: Gate,
}

impl GenerationJob for GatedJob {
    fn description(&self) -> String {
        self.inner.description()
    }

    fn run(&mut self) -> bool {
        self.gate.wait();
        self.inner.run()
    }

    fn take_results(&mut self) -> Vec<EntryData> {
        self.inner.take_results()
    }

    fn last_error_message(&self) -> Option<String> {
        self.inner.last_error_message()
    }
}

/// Statistics factory whose jobs block on a shared [`Gate`]
pub struct GatedFactory {
    inner: ImageStatisticsJobFactory,
    gate: Gate,
}

impl JobFactory for GatedFactory {
    fn schema(&self) -> ResultSchema {
        self.inner.schema()
    }

    fn parameters(&self) -> ParameterSet {
        self.inner.parameters()
    }

    fn create_job(
        &self,
        source: &Entry,
        roi: Option<&Entry>,
    ) -> Result<Box<dyn GenerationJob>, GenerationError> {
        Ok(Box::new(GatedJob {
            inner: self.inner.create_job(source, roi)?,
            gate: self.gate.clone(),
        }))
    }

    fn placeholder_data(&self) -> EntryData {
        self.inner.placeholder_data()
    }

    fn artifact_name(&self, source: &Entry, roi: Option<&Entry>) -> String {
        self.inner.artifact_name(source, roi)
    }
}

pub type GatedGenerator = Generator<ImageAndRoiPairs, GatedFactory>;

/// Statistics generator over `images` whose jobs wait for `gate`
pub fn gated_generator(
    store: &Arc<ObjectStore>,
    images: Vec<EntryId>,
    gate: &Gate,
) -> GatedGenerator {
    Generator::new(
        Some(Arc::clone(store)),
        ImageAndRoiPairs::new(images, Vec::new()),
        GatedFactory {
            inner: ImageStatisticsJobFactory::default(),
            gate: gate.clone(),
        },
        &GeneratorConfig::default(),
    )
    .unwrap()
}

/// Image with voxel values `scale * (x + 4y + 16z)`
pub fn add_image(store: &ObjectStore, name: &str, scale: f64) -> EntryId {
    let image = Image::from_fn(DIMS, |x, y, z| scale * (x + 4 * y + 16 * z) as f64);
    store.add(Entry::new(name, EntryData::Image(Arc::new(image))))
}

pub fn drain(events: &Receiver<GeneratorEvent>) -> Vec<GeneratorEvent> {
    events.try_iter().collect()
}

pub fn names(events: &[GeneratorEvent]) -> Vec<&'static str> {
    events.iter().map(GeneratorEvent::name).collect()
}

pub fn count(events: &[GeneratorEvent], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

/// Final statistics entries for `image` (and `roi`, or no ROI at all) with the given bins
pub fn final_results(
    store: &ObjectStore,
    image: EntryId,
    roi: Option<EntryId>,
    bins: u32,
) -> Vec<Entry> {
    let schema = ResultSchema::image_statistics();
    let roi_predicate = match roi {
        Some(roi) => schema.roi_rule.sources_predicate_for(roi),
        None => Predicate::not(schema.roi_rule.any_relation_predicate()),
    };
    store.query(&Predicate::and([
        Predicate::kind_is(DataKind::Statistics),
        schema.source_rule.sources_predicate_for(image),
        roi_predicate,
        Predicate::property_equals("histogram_bins", bins),
        Predicate::not(Predicate::has_property(GENERATION_STATUS_PROPERTY)),
    ]))
}

pub fn all_statistics(store: &ObjectStore) -> Vec<Entry> {
    store.query(&Predicate::kind_is(DataKind::Statistics))
}

pub fn statistics_of(entry: &Entry) -> Arc<StatisticsContainer> {
    match &entry.data {
        EntryData::Statistics(stats) => Arc::clone(stats),
        other => panic!("not a statistics entry: {:?}", other.kind()),
    }
}

/// Serializes tests that touch process environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Isolated config home for a test; restores the environment on drop
pub struct IsolatedEnv {
    pub dir: TempDir,
    saved: Vec<(&'static str, Option<String>)>,
    _guard: MutexGuard<'static, ()>,
}

const ISOLATED_VARS: [&str; 4] = [
    "HOME",
    "XDG_CONFIG_HOME",
    "STATGEN_ENV",
    "STATGEN__GENERATOR__HISTOGRAM_BINS",
];

impl IsolatedEnv {
    pub fn new() -> Self {
        let guard = ENV_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dir = TempDir::new().unwrap();
        let saved = ISOLATED_VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();

        std::env::set_var("HOME", dir.path());
        std::env::set_var("XDG_CONFIG_HOME", dir.path().join(".config"));
        std::env::remove_var("STATGEN_ENV");
        std::env::remove_var("STATGEN__GENERATOR__HISTOGRAM_BINS");

        Self {
            dir,
            saved,
            _guard: guard,
        }
    }
}

impl Drop for IsolatedEnv {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}
