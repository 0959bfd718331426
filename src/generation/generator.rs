//! Generator
//!
//! Orchestrates cached derived-data generation. A pass walks every (source, ROI) pair
//! of the pair strategy, reuses fresh artifacts, publishes placeholders for missing
//! ones and dispatches jobs to the worker pool. Job completions, store change
//! notifications and queued generate requests all arrive on one owner queue and are
//! applied on the thread that owns the generator, so the generator is the single
//! writer of its artifacts.

use crate::config::GeneratorConfig;
use crate::error::GenerationError;
use crate::generation::events::{GeneratorEvent, GeneratorEventBus};
use crate::generation::job::JobFactory;
use crate::generation::key::{
    CacheKey, GenerationStatus, ParameterSet, ResultSchema, GENERATION_STATUS_PROPERTY,
};
use crate::generation::pairs::{Pair, PairStrategy};
use crate::generation::pool::{JobCompletion, JobOutcome, JobPool, JobTicket, OwnerMessage};
use crate::generation::query;
use crate::store::{clock, Entry, ListenerId, ObjectStore};
use crate::types::{EntryId, JobId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Counters over the generator's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    /// Completions dropped because their source or ROI left the store
    pub discarded: u64,
}

/// Generic cached-generation orchestrator, specialised by a pair strategy and a job factory
pub struct Generator<P: PairStrategy, F: JobFactory> {
    store: Option<Arc<ObjectStore>>,
    listener: Option<ListenerId>,
    strategy: P,
    factory: F,
    pool: JobPool,
    events: GeneratorEventBus,
    owner_tx: Sender<OwnerMessage>,
    owner_rx: Receiver<OwnerMessage>,
    in_generate: bool,
    restart_requested: bool,
    generate_queued: bool,
    work_in_progress: bool,
    auto_update: bool,
    in_flight: HashMap<JobId, CacheKey>,
    /// Keys whose ROI cannot be related to an artifact; reported once each
    rejected_rois: HashSet<CacheKey>,
    stats: GeneratorStats,
    finished_count: u64,
}

impl<P: PairStrategy, F: JobFactory> Generator<P, F> {
    pub fn new(
        store: Option<Arc<ObjectStore>>,
        strategy: P,
        factory: F,
        config: &GeneratorConfig,
    ) -> Result<Self, GenerationError> {
        let pool = JobPool::new(config.worker_threads)?;
        let (owner_tx, owner_rx) = channel();
        let mut generator = Self {
            store: None,
            listener: None,
            strategy,
            factory,
            pool,
            events: GeneratorEventBus::new(),
            owner_tx,
            owner_rx,
            in_generate: false,
            restart_requested: false,
            generate_queued: false,
            work_in_progress: false,
            auto_update: config.auto_update,
            in_flight: HashMap::new(),
            rejected_rois: HashSet::new(),
            stats: GeneratorStats::default(),
            finished_count: 0,
        };
        generator.attach_store(store);
        Ok(generator)
    }

    pub fn store(&self) -> Option<&Arc<ObjectStore>> {
        self.store.as_ref()
    }

    /// Replace the store the generator works on
    pub fn set_store(&mut self, store: Option<Arc<ObjectStore>>) {
        let unchanged = match (&self.store, &store) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.attach_store(store);
        if self.auto_update {
            self.ensure_rechecking_and_generation();
        }
    }

    fn attach_store(&mut self, store: Option<Arc<ObjectStore>>) {
        self.detach_store();
        if let Some(store) = &store {
            let sender = Mutex::new(self.owner_tx.clone());
            let listener = store.subscribe(move |event| {
                let _ = sender.lock().send(OwnerMessage::StoreChanged(*event));
            });
            self.listener = Some(listener);
        }
        self.store = store;
    }

    fn detach_store(&mut self) {
        if let (Some(store), Some(listener)) = (&self.store, self.listener.take()) {
            store.unsubscribe(listener);
        }
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn set_auto_update(&mut self, auto_update: bool) {
        self.auto_update = auto_update;
    }

    pub fn strategy(&self) -> &P {
        &self.strategy
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Mutate the pair strategy. `update` returns whether anything changed;
    /// with auto-update on, a change schedules regeneration.
    pub fn update_strategy(&mut self, update: impl FnOnce(&mut P) -> bool) -> bool {
        let changed = update(&mut self.strategy);
        if changed && self.auto_update {
            self.ensure_rechecking_and_generation();
        }
        changed
    }

    /// Mutate the job factory (e.g. its parameters); same contract as
    /// [`update_strategy`](Self::update_strategy).
    pub fn update_factory(&mut self, update: impl FnOnce(&mut F) -> bool) -> bool {
        let changed = update(&mut self.factory);
        if changed && self.auto_update {
            self.ensure_rechecking_and_generation();
        }
        changed
    }

    /// New receiver for generator events
    pub fn subscribe(&mut self) -> Receiver<GeneratorEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> GeneratorStats {
        self.stats
    }

    pub fn in_flight_jobs(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether a `GenerationStarted` is still waiting for its `GenerationFinished`
    pub fn is_work_in_progress(&self) -> bool {
        self.work_in_progress
    }

    pub fn finished_count(&self) -> u64 {
        self.finished_count
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.workers()
    }

    /// Run generation passes until no restart is requested.
    ///
    /// Returns whether every pair ended the last pass with a fresh final artifact.
    /// A call made while a pass is running only requests a restart and returns `false`.
    pub fn generate(&mut self) -> Result<bool, GenerationError> {
        let store = self.store.clone().ok_or(GenerationError::StoreNotSet)?;
        if self.in_generate {
            self.restart_requested = true;
            return Ok(false);
        }

        self.in_generate = true;
        let result = self.run_passes(&store);
        self.in_generate = false;
        result
    }

    /// Make sure a generation pass picks up the latest state, without recursing
    pub fn ensure_rechecking_and_generation(&mut self) {
        if self.in_generate {
            self.restart_requested = true;
        } else if !self.generate_queued {
            self.generate_queued = true;
            // The receiver lives in `self`, so the send cannot fail.
            let _ = self.owner_tx.send(OwnerMessage::GenerateRequested);
        }
    }

    /// Handle every message already waiting on the owner queue. Returns how many were handled.
    pub fn process_events(&mut self) -> Result<usize, GenerationError> {
        let mut handled = 0;
        loop {
            match self.owner_rx.try_recv() {
                Ok(message) => {
                    self.handle_message(message)?;
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(handled)
    }

    /// Pump the owner queue until generation has finished: no job in flight, no
    /// generate request queued and no outstanding `GenerationStarted`.
    ///
    /// A failed job leaves its key unfinished, so this times out after a failure;
    /// use [`run_until_idle`](Self::run_until_idle) to wait for jobs regardless of outcome.
    pub fn wait_for_generation_finished(&mut self, timeout: Duration) -> Result<(), GenerationError> {
        self.pump_until(timeout, |g| {
            !g.work_in_progress && !g.generate_queued && g.in_flight.is_empty()
        })
    }

    /// Pump the owner queue until no job is in flight and nothing is queued
    pub fn run_until_idle(&mut self, timeout: Duration) -> Result<(), GenerationError> {
        self.pump_until(timeout, |g| !g.generate_queued && g.in_flight.is_empty())
    }

    fn pump_until(
        &mut self,
        timeout: Duration,
        done: impl Fn(&Self) -> bool,
    ) -> Result<(), GenerationError> {
        let deadline = Instant::now() + timeout;
        self.process_events()?;
        loop {
            if done(&*self) {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GenerationError::Timeout(timeout));
            }
            match self.owner_rx.recv_timeout(remaining) {
                Ok(message) => self.handle_message(message)?,
                Err(RecvTimeoutError::Timeout) => return Err(GenerationError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(GenerationError::WorkerPool("owner queue closed".to_string()))
                }
            }
        }
    }

    fn handle_message(&mut self, message: OwnerMessage) -> Result<(), GenerationError> {
        match message {
            OwnerMessage::JobFinished(completion) => self.on_job_finished(completion),
            OwnerMessage::StoreChanged(event) => {
                if self.auto_update && self.strategy.is_relevant(event.entry_id()) {
                    debug!(entry = %event.entry_id(), ?event, "Relevant store change");
                    self.ensure_rechecking_and_generation();
                }
                Ok(())
            }
            OwnerMessage::GenerateRequested => {
                self.generate_queued = false;
                match self.generate() {
                    Ok(_) | Err(GenerationError::StoreNotSet) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn run_passes(&mut self, store: &Arc<ObjectStore>) -> Result<bool, GenerationError> {
        let mut pass = 0u32;
        let all_valid = loop {
            pass += 1;
            self.restart_requested = false;
            let all_valid = self.run_pass(store, pass)?;

            // Completions that arrived meanwhile feed the restart flag.
            self.process_events()?;
            if !self.restart_requested {
                break all_valid;
            }
            debug!(pass, "Restarting generation pass");
        };

        if all_valid && self.work_in_progress {
            self.work_in_progress = false;
            self.finished_count += 1;
            info!(passes = pass, "Generation finished");
            self.events.emit(GeneratorEvent::GenerationFinished);
        }
        Ok(all_valid)
    }

    fn run_pass(&mut self, store: &Arc<ObjectStore>, pass: u32) -> Result<bool, GenerationError> {
        let pairs = self.strategy.pairs();
        let params = self.factory.parameters();
        let schema = self.factory.schema();
        debug!(pass, pairs = pairs.len(), "Generation pass started");

        let mut all_valid = true;
        for pair in pairs {
            if !self.process_pair(store, &schema, &params, pair)? {
                all_valid = false;
            }
        }

        debug!(pass, all_valid, "Generation pass completed");
        Ok(all_valid)
    }

    /// Returns whether the pair ended up with a fresh final artifact
    fn process_pair(
        &mut self,
        store: &Arc<ObjectStore>,
        schema: &ResultSchema,
        params: &ParameterSet,
        (source_id, roi_id): Pair,
    ) -> Result<bool, GenerationError> {
        let Some(source) = store.get(source_id) else {
            trace!(source = %source_id, "Skipping pair, source no longer in store");
            return Ok(true);
        };
        let roi = match roi_id {
            Some(id) => match store.get(id) {
                Some(roi) => Some(roi),
                None => {
                    trace!(roi = %id, "Skipping pair, ROI no longer in store");
                    return Ok(true);
                }
            },
            None => None,
        };
        let key = CacheKey::new(source_id, roi_id, params.clone());

        if let Some(roi) = &roi {
            if !schema.roi_rule.is_destination_candidate(roi) {
                self.reject_roi(key, roi);
                return Ok(false);
            }
        }

        if let Some(fresh) =
            query::find_latest(store, schema, &source, roi.as_ref(), params, true, false)
        {
            query::remove_obsolete(store, schema, &key, &[fresh.id]);
            return Ok(true);
        }

        let latest = query::find_latest(store, schema, &source, roi.as_ref(), params, false, false);
        let latest_status = latest.as_ref().and_then(GenerationStatus::of);
        if latest_status == Some(GenerationStatus::WorkInProgress) {
            trace!(source = %source_id, roi = ?roi_id, "Job already running for pair");
            return Ok(false);
        }

        let job = self.factory.create_job(&source, roi.as_ref())?;

        let placeholder = match latest {
            Some(entry) if latest_status == Some(GenerationStatus::Pending) => entry.id,
            _ => self.publish_placeholder(store, schema, params, &source, roi.as_ref())?,
        };
        store.set_property(
            placeholder,
            GENERATION_STATUS_PROPERTY,
            GenerationStatus::WorkInProgress.as_str(),
        )?;

        let job_id = JobId::next();
        let stamp = clock::tick();
        info!(
            job = %job_id,
            source = %source_id,
            roi = ?roi_id,
            description = %job.description(),
            "Dispatching generation job"
        );
        self.events.emit(GeneratorEvent::GenerationStarted {
            source: source_id,
            roi: roi_id,
            job: job_id,
        });
        self.work_in_progress = true;
        self.stats.dispatched += 1;
        self.in_flight.insert(job_id, key.clone());
        self.pool.submit(
            JobTicket {
                job_id,
                key,
                stamp,
                job,
            },
            self.owner_tx.clone(),
        );
        Ok(false)
    }

    /// An ROI no artifact can be related to fails like a job would, without
    /// aborting the pass.
    fn reject_roi(&mut self, key: CacheKey, roi: &Entry) {
        let source = key.source;
        if !self.rejected_rois.insert(key) {
            return;
        }
        let job = JobId::next();
        let message = format!("Unsupported ROI type: {:?}", roi.kind());
        self.stats.failed += 1;
        error!(
            job = %job,
            source = %source,
            roi = %roi.id,
            error = %message,
            "Cannot generate for ROI"
        );
        self.events.emit(GeneratorEvent::JobError { message, job });
    }

    fn publish_placeholder(
        &self,
        store: &ObjectStore,
        schema: &ResultSchema,
        params: &ParameterSet,
        source: &Entry,
        roi: Option<&Entry>,
    ) -> Result<EntryId, GenerationError> {
        let mut entry = Entry::new(
            self.factory.artifact_name(source, roi),
            self.factory.placeholder_data(),
        )
        .with_property(GENERATION_STATUS_PROPERTY, GenerationStatus::Pending.as_str());
        schema.source_rule.connect(&mut entry, source)?;
        if let Some(roi) = roi {
            schema.roi_rule.connect(&mut entry, roi)?;
        }
        params.apply_to(&mut entry);

        let id = store.add(entry);
        debug!(placeholder = %id, source = %source.id, "Published placeholder");
        Ok(id)
    }

    fn on_job_finished(&mut self, completion: JobCompletion) -> Result<(), GenerationError> {
        let JobCompletion {
            job,
            key,
            stamp,
            outcome,
            duration,
        } = completion;
        self.in_flight.remove(&job);

        let results = match outcome {
            JobOutcome::Failed(message) => {
                self.stats.failed += 1;
                error!(
                    job = %job,
                    source = %key.source,
                    roi = ?key.roi,
                    error = %message,
                    "Generation job failed"
                );
                self.events.emit(GeneratorEvent::JobError { message, job });
                return Ok(());
            }
            JobOutcome::Succeeded(results) => results,
        };

        let inputs = self.store.clone().and_then(|store| {
            let source = store.get(key.source)?;
            let roi = match key.roi {
                Some(id) => Some(store.get(id)?),
                None => None,
            };
            Some((store, source, roi))
        });
        let Some((store, source, roi)) = inputs else {
            self.stats.discarded += 1;
            warn!(job = %job, source = %key.source, roi = ?key.roi, "Discarding result, inputs left the store");
            return Ok(());
        };

        let schema = self.factory.schema();
        let name = self.factory.artifact_name(&source, roi.as_ref());
        let mut entries = Vec::with_capacity(results.len());
        for data in results {
            let mut entry = Entry::new(name.clone(), data);
            schema.source_rule.connect(&mut entry, &source)?;
            if let Some(roi) = &roi {
                schema.roi_rule.connect(&mut entry, roi)?;
            }
            key.params.apply_to(&mut entry);
            entry.modified = stamp;
            entries.push(entry);
        }

        let ids = store.add_all(entries);
        query::remove_obsolete(&store, &schema, &key, &ids);
        self.stats.completed += 1;
        info!(
            job = %job,
            source = %key.source,
            roi = ?key.roi,
            results = ids.len(),
            duration_ms = duration.as_millis() as u64,
            "Generation job completed"
        );
        let produced = !ids.is_empty();
        self.events
            .emit(GeneratorEvent::NewDataAvailable { entries: ids });
        if produced {
            self.ensure_rechecking_and_generation();
        }
        Ok(())
    }
}

impl<P: PairStrategy, F: JobFactory> Drop for Generator<P, F> {
    fn drop(&mut self) {
        self.detach_store();
    }
}
