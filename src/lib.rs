//! Portfolio ledger - event-log state reconstruction
//!
//! This library replays an append-only log of financial events (trades,
//! option lifecycle events, cash movements, dividends and price updates)
//! into a deterministic portfolio snapshot: holdings, cost basis, cash,
//! option positions, realized/unrealized P&L and year-to-date income.

pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ledger;
pub mod reconstruct;
pub mod services;
pub mod snapshot;

// Re-export commonly used types
pub use bus::{SnapshotBus, SnapshotUpdate};
pub use config::EngineConfig;
pub use error::{ReplayError, ReplayWarning};
pub use events::{Event, EventPayload, EventRecord, EventType};
pub use ledger::ReplayOptions;
pub use reconstruct::{reconstruct, Diagnostic, Reconstruction, Severity};
pub use snapshot::Snapshot;

#[cfg(test)]
mod reconstruct_tests;
#[cfg(test)]
mod test_support;
