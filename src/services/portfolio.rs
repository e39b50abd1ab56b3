use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::bus::{SnapshotBus, SnapshotUpdate};
use crate::error::ServiceError;
use crate::events::{Event, EventRecord};
use crate::ledger::ReplayOptions;
use crate::reconstruct::reconstruct;
use crate::snapshot::Snapshot;

/// In-memory append-only event log.
///
/// Appends must carry strictly increasing event ids. Readers copy a
/// length-bounded slice, so an append racing a replay is never observed by it.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON-lines file of event records. Blank lines are ignored.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let log = EventLog::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: EventRecord =
                serde_json::from_str(&line).map_err(|source| ServiceError::Decode {
                    line: idx + 1,
                    source,
                })?;
            log.append(Event::try_from(record)?)?;
        }

        info!("[SERVICE] Loaded {} events from {}", log.len(), path.as_ref().display());
        Ok(log)
    }

    pub fn append(&self, event: Event) -> Result<(), ServiceError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = events.last() {
            if event.event_id <= last.event_id {
                return Err(ServiceError::OutOfOrderAppend {
                    event_id: event.event_id,
                    last_id: last.event_id,
                });
            }
        }
        events.push(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_event_id(&self) -> Option<u64> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|e| e.event_id)
    }

    /// Events with id greater than `after`, among the first `bound` entries
    pub fn events_after(&self, after: Option<u64>, bound: usize) -> Vec<Event> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let prefix = &events[..bound.min(events.len())];
        let start = match after {
            Some(id) => prefix.partition_point(|e| e.event_id <= id),
            None => 0,
        };
        prefix[start..].to_vec()
    }
}

/// Serves the latest snapshot of an event log.
///
/// `refresh` replays only the events appended since the cached snapshot;
/// `rebuild` replays from scratch. Both publish the result on the bus.
#[derive(Clone)]
pub struct PortfolioService {
    log: EventLog,
    options: ReplayOptions,
    cached: Arc<Mutex<Option<Arc<Snapshot>>>>,
    bus: SnapshotBus,
}

impl PortfolioService {
    pub fn new(log: EventLog, options: ReplayOptions, bus: SnapshotBus) -> Self {
        Self {
            log,
            options,
            cached: Arc::new(Mutex::new(None)),
            bus,
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn bus(&self) -> &SnapshotBus {
        &self.bus
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Bring the cached snapshot up to the current end of the log
    pub fn refresh(&self) -> Result<SnapshotUpdate, ServiceError> {
        let start = self.snapshot();
        self.replay_from(start)
    }

    /// Discard the cache and replay the whole log
    pub fn rebuild(&self) -> Result<SnapshotUpdate, ServiceError> {
        self.replay_from(None)
    }

    fn replay_from(&self, start: Option<Arc<Snapshot>>) -> Result<SnapshotUpdate, ServiceError> {
        let bound = self.log.len();
        let after = start.as_ref().and_then(|s| s.as_of_event_id());
        let suffix = self.log.events_after(after, bound);
        debug!("[SERVICE] Replaying {} new events after {:?}", suffix.len(), after);

        let outcome = reconstruct(&suffix, start.as_deref(), &self.options)?;
        if let Some(e) = &outcome.halted {
            warn!("[SERVICE] Replay halted: {}", e);
        }

        let snapshot = Arc::new(outcome.snapshot);
        self.store(&snapshot);

        let update = SnapshotUpdate {
            snapshot,
            diagnostics: outcome.diagnostics,
            halted: outcome.halted,
        };
        self.bus.publish(update.clone());
        Ok(update)
    }

    /// Keep whichever snapshot is further along; concurrent refreshes may
    /// finish out of order.
    fn store(&self, snapshot: &Arc<Snapshot>) {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let newer = match cached.as_ref() {
            Some(current) => snapshot.as_of_event_id() >= current.as_of_event_id(),
            None => true,
        };
        if newer {
            *cached = Some(Arc::clone(snapshot));
        }
    }
}
