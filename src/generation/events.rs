//! Generator events and the in-process bus that fans them out to subscribers.

use crate::types::{EntryId, JobId};
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

/// Observable generator protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorEvent {
    /// A job was dispatched for the pair
    GenerationStarted {
        source: EntryId,
        roi: Option<EntryId>,
        job: JobId,
    },
    /// Final artifacts were added to the store
    NewDataAvailable { entries: Vec<EntryId> },
    /// Every pair has a fresh final artifact again
    GenerationFinished,
    JobError { message: String, job: JobId },
}

impl GeneratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GeneratorEvent::GenerationStarted { .. } => "generation_started",
            GeneratorEvent::NewDataAvailable { .. } => "new_data_available",
            GeneratorEvent::GenerationFinished => "generation_finished",
            GeneratorEvent::JobError { .. } => "job_error",
        }
    }
}

/// Fan-out of generator events; each subscriber gets its own channel.
/// Disconnected subscribers are dropped on the next emit.
#[derive(Default)]
pub struct GeneratorEventBus {
    subscribers: Vec<Sender<GeneratorEvent>>,
}

impl GeneratorEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<GeneratorEvent> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: GeneratorEvent) {
        debug!(
            event = event.name(),
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "Generator event"
        );
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
