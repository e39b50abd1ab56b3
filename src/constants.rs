//! Engine-wide constants
//!
//! Tolerances, defaults and the stable diagnostic codes attached to every
//! anomaly the replay reports.

/// Numeric defaults for the ledger
pub mod ledger {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Maximum absolute difference between a reported total and the computed one
    /// before a reconciliation warning is raised (one cent)
    pub const RECONCILE_TOLERANCE: Decimal = dec!(0.01);

    /// Shares per option contract
    pub const CONTRACT_MULTIPLIER: u32 = 100;
}

/// Service defaults
pub mod service {
    /// Capacity of the snapshot broadcast channel
    pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

    /// Default location of the JSON-lines event log read by the binary
    pub const DEFAULT_EVENT_LOG_PATH: &str = "data/events.jsonl";

    /// Default config file
    pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
}

/// Diagnostic codes for structured logging and collaborator consumption
pub mod diagnostics {
    pub const ORDERING: &str = "ordering_error";
    pub const INSUFFICIENT_SHARES: &str = "insufficient_shares";
    pub const UNKNOWN_OPTION: &str = "unknown_option";
    pub const DUPLICATE_OPTION: &str = "duplicate_option";
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    pub const MALFORMED_PAYLOAD: &str = "malformed_payload";
    pub const ARITHMETIC_OVERFLOW: &str = "arithmetic_overflow";
    pub const RECONCILIATION: &str = "reconciliation_warning";
    pub const OVERDRAFT: &str = "withdrawal_exceeds_balance";
    pub const CASH_DELTA_IGNORED: &str = "cash_delta_ignored";
    pub const BACKDATED_TIMESTAMP: &str = "backdated_timestamp";
    pub const SUPERSEDED_PRICE: &str = "superseded_price";
    pub const ASSIGNMENT_MISMATCH: &str = "assignment_mismatch";
}
