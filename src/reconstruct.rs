//! State reconstructor: replays an event sequence into a `Snapshot`.
//!
//! `reconstruct` is a pure function of its inputs. The same events and
//! starting snapshot always produce the same result, and replaying a suffix
//! on top of a prefix's snapshot gives the same snapshot as replaying the
//! whole sequence.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ReplayError, ReplayWarning};
use crate::events::Event;
use crate::ledger::{LedgerState, ReplayOptions};
use crate::snapshot::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// Event skipped, replay continued
    Error,
    /// Replay halted at this event
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub event_id: u64,
    pub severity: Severity,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn from_warning(event_id: u64, warning: &ReplayWarning) -> Self {
        let severity = if warning.is_informational() {
            Severity::Info
        } else {
            Severity::Warning
        };
        Self {
            event_id,
            severity,
            code: warning.code().to_string(),
            message: warning.to_string(),
        }
    }

    pub fn from_error(event_id: u64, err: &ReplayError) -> Self {
        let severity = if err.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Error
        };
        Self {
            event_id,
            severity,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a replay that was allowed to start
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    /// Full state, or the last consistent state before a fatal error
    pub snapshot: Snapshot,
    pub diagnostics: Vec<Diagnostic>,
    pub halted: Option<ReplayError>,
}

impl Reconstruction {
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }

    /// Event the replay stopped at, if it stopped early
    pub fn failed_at(&self) -> Option<u64> {
        if self.halted.is_none() {
            return None;
        }
        self.diagnostics
            .iter()
            .rev()
            .find(|d| d.severity == Severity::Fatal)
            .map(|d| d.event_id)
    }
}

/// Check that event ids strictly increase, starting after `after`
pub fn validate_ordering(events: &[Event], after: Option<u64>) -> Result<(), ReplayError> {
    let mut previous = after;
    for event in events {
        if let Some(previous_id) = previous {
            if event.event_id <= previous_id {
                return Err(ReplayError::Ordering {
                    event_id: event.event_id,
                    previous_id,
                });
            }
        }
        previous = Some(event.event_id);
    }
    Ok(())
}

/// Replay `events` on top of `starting` (or an empty ledger).
///
/// Fails only when the sequence is out of order; every other problem is
/// reported through the returned `Reconstruction`.
pub fn reconstruct(
    events: &[Event],
    starting: Option<&Snapshot>,
    opts: &ReplayOptions,
) -> Result<Reconstruction, ReplayError> {
    let after = starting.and_then(Snapshot::as_of_event_id);
    if let Err(e) = validate_ordering(events, after) {
        error!("[REPLAY] Refusing to replay: {}", e);
        return Err(e);
    }

    let mut state = match starting {
        Some(snapshot) => LedgerState::from_snapshot(snapshot),
        None => LedgerState::new(),
    };
    let mut diagnostics = Vec::new();
    let mut halted = None;

    debug!(
        "[REPLAY] Replaying {} events after {:?}",
        events.len(),
        after
    );

    for event in events {
        match state.apply(event, opts) {
            Ok(warnings) => {
                for warning in &warnings {
                    let diagnostic = Diagnostic::from_warning(event.event_id, warning);
                    debug!(
                        "[REPLAY] Event {} {}: {}",
                        event.event_id, diagnostic.code, diagnostic.message
                    );
                    diagnostics.push(diagnostic);
                }
            }
            Err(e) if !e.is_fatal() => {
                warn!("[REPLAY] Skipping event {}: {}", event.event_id, e);
                diagnostics.push(Diagnostic::from_error(event.event_id, &e));
                state.skip(event);
            }
            Err(e) => {
                error!("[REPLAY] Halted at event {}: {}", event.event_id, e);
                diagnostics.push(Diagnostic::from_error(event.event_id, &e));
                halted = Some(e);
                break;
            }
        }
    }

    let snapshot = state.to_snapshot(opts.ytd_year);
    info!(
        "[REPLAY] Reconstructed through event {:?} (cash {}, {} holdings, {} diagnostics)",
        snapshot.as_of_event_id(),
        snapshot.cash_balance(),
        snapshot.holdings().len(),
        diagnostics.len()
    );

    Ok(Reconstruction {
        snapshot,
        diagnostics,
        halted,
    })
}
