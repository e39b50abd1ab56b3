//! Custom error types for the replay engine
//!
//! Fatal and non-fatal replay failures are typed here; warnings are kept
//! apart from errors so the reconstructor can record them without halting.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::constants::diagnostics;
use crate::ledger::options::OptionStatus;

/// Errors raised while applying events to the ledger
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    #[error("Event ordering violated: event {event_id} follows {previous_id}")]
    Ordering { event_id: u64, previous_id: u64 },

    #[error(
        "Insufficient shares of {ticker} at event {event_id}: requested {requested}, held {held}"
    )]
    InsufficientShares {
        event_id: u64,
        ticker: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Unknown option position: {uuid}")]
    UnknownOption { uuid: String },

    #[error("Option position already exists: {uuid}")]
    DuplicateOption { uuid: String },

    #[error("Invalid transition for option {uuid}: {from} -> {to}")]
    InvalidTransition {
        uuid: String,
        from: OptionStatus,
        to: OptionStatus,
    },

    #[error("Malformed {event_type} payload at event {event_id}: {reason}")]
    MalformedPayload {
        event_id: u64,
        event_type: String,
        reason: String,
    },

    #[error("Arithmetic overflow at event {event_id} computing {context}")]
    ArithmeticOverflow { event_id: u64, context: String },
}

impl ReplayError {
    /// Whether this error halts the replay. Option lifecycle violations only
    /// skip the offending event.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReplayError::UnknownOption { .. }
                | ReplayError::DuplicateOption { .. }
                | ReplayError::InvalidTransition { .. }
        )
    }

    /// Stable diagnostic code
    pub fn code(&self) -> &'static str {
        match self {
            ReplayError::Ordering { .. } => diagnostics::ORDERING,
            ReplayError::InsufficientShares { .. } => diagnostics::INSUFFICIENT_SHARES,
            ReplayError::UnknownOption { .. } => diagnostics::UNKNOWN_OPTION,
            ReplayError::DuplicateOption { .. } => diagnostics::DUPLICATE_OPTION,
            ReplayError::InvalidTransition { .. } => diagnostics::INVALID_TRANSITION,
            ReplayError::MalformedPayload { .. } => diagnostics::MALFORMED_PAYLOAD,
            ReplayError::ArithmeticOverflow { .. } => diagnostics::ARITHMETIC_OVERFLOW,
        }
    }
}

/// Non-fatal anomalies recorded during replay
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayWarning {
    #[error("{context}: expected {expected}, got {actual}")]
    Reconciliation {
        context: String,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Withdrawal of {amount} exceeds balance {balance}")]
    Overdraft { amount: Decimal, balance: Decimal },

    #[error("cash_delta {cash_delta} ignored because affects_cash is false")]
    CashDeltaIgnored { cash_delta: Decimal },

    #[error("Timestamp {timestamp} is earlier than preceding event at {previous}")]
    BackdatedTimestamp { timestamp: String, previous: String },

    #[error("Price update for {ticker} at {timestamp} superseded by cached price at {cached}")]
    SupersededPrice {
        ticker: String,
        timestamp: String,
        cached: String,
    },

    #[error("Assignment of option {uuid}: {detail}")]
    AssignmentMismatch { uuid: String, detail: String },
}

impl ReplayWarning {
    pub fn code(&self) -> &'static str {
        match self {
            ReplayWarning::Reconciliation { .. } => diagnostics::RECONCILIATION,
            ReplayWarning::Overdraft { .. } => diagnostics::OVERDRAFT,
            ReplayWarning::CashDeltaIgnored { .. } => diagnostics::CASH_DELTA_IGNORED,
            ReplayWarning::BackdatedTimestamp { .. } => diagnostics::BACKDATED_TIMESTAMP,
            ReplayWarning::SupersededPrice { .. } => diagnostics::SUPERSEDED_PRICE,
            ReplayWarning::AssignmentMismatch { .. } => diagnostics::ASSIGNMENT_MISMATCH,
        }
    }

    /// Superseded prices are expected in normal operation
    pub fn is_informational(&self) -> bool {
        matches!(self, ReplayWarning::SupersededPrice { .. })
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Event log and service errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Append rejected: event {event_id} does not follow last event {last_id}")]
    OutOfOrderAppend { event_id: u64, last_id: u64 },

    #[error("Replay failed: {0}")]
    Replay(#[from] ReplayError),

    #[error("Failed to read event log: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid event record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
