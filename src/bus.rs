use std::sync::Arc;

use crate::error::ReplayError;
use crate::reconstruct::Diagnostic;
use crate::snapshot::Snapshot;
use tokio::sync::broadcast;

/// Published after every refresh of the cached snapshot
#[derive(Clone, Debug)]
pub struct SnapshotUpdate {
    pub snapshot: Arc<Snapshot>,
    pub diagnostics: Vec<Diagnostic>,
    pub halted: Option<ReplayError>,
}

#[derive(Clone)]
pub struct SnapshotBus {
    tx: broadcast::Sender<SnapshotUpdate>,
}

impl SnapshotBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers reached; zero when nobody listens
    pub fn publish(&self, update: SnapshotUpdate) -> usize {
        self.tx.send(update).unwrap_or(0)
    }
}
