//! The logging capability handed to the scheduler and the reconciler
//!
//! Instead of a process-wide logger, both components receive an
//! `Arc<dyn EventSink>` at construction time and report every
//! [`SyncEvent`] through it, as it happens.
//!
//! - [`TracingSink`] forwards events to `tracing`; the subscriber installed
//!   by [`crate::logging::init_logging`] writes them to stdout and the log file.
//! - [`MemorySink`] keeps events in memory so tests can assert on them.

use crate::types::{ActionRecord, SyncEvent};
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Receiver of synchronization events
///
/// Implementations must be thread-safe: the reconciler may report from
/// several file workers at once.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn emit(&self, event: &SyncEvent);
}

/// Sink that writes each event as one `tracing` record
///
/// Mutations and cycle markers are `INFO`, per-entry failures `WARN`, and
/// the terminal abort `ERROR`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing sink
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: &SyncEvent) {
        match event {
            SyncEvent::EntryFailed(_) => warn!("{}", event),
            SyncEvent::Aborted(_) => error!("{}", event),
            _ => info!("{}", event),
        }
    }
}

/// Sink that records events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    /// Create an empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Rendered log messages, one per event
    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(ToString::to_string).collect()
    }

    /// Only the mutation records
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::Action(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything received so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}
