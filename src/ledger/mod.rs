//! Working state folded event by event during a replay.

pub mod accumulator;
pub mod cost_basis;
pub mod options;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::snapshot::{Holding, IncomeBreakdown, PriceQuote, RealizedPnl, Snapshot};

pub use accumulator::ReplayOptions;
use cost_basis::CostBasisTracker;
use options::OptionRegistry;

/// Mutable ledger state, owned by one reconstruction call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LedgerState {
    pub(crate) cash: Decimal,
    pub(crate) holdings: BTreeMap<String, Holding>,
    pub(crate) cost_basis: CostBasisTracker,
    pub(crate) options: OptionRegistry,
    pub(crate) prices: BTreeMap<String, PriceQuote>,
    pub(crate) realized: RealizedPnl,
    pub(crate) income_by_year: BTreeMap<i32, IncomeBreakdown>,
    pub(crate) last_event_id: Option<u64>,
    pub(crate) last_timestamp: Option<DateTime<Utc>>,
    pub(crate) events_applied: u64,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously built snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            cash: snapshot.cash_balance,
            holdings: snapshot.holdings.clone(),
            cost_basis: CostBasisTracker::from_lots(snapshot.cost_basis.clone()),
            options: OptionRegistry::from_positions(snapshot.options.clone()),
            prices: snapshot.latest_prices.clone(),
            realized: snapshot.realized.clone(),
            income_by_year: snapshot.income_by_year.clone(),
            last_event_id: snapshot.as_of_event_id,
            last_timestamp: snapshot.latest_timestamp,
            events_applied: snapshot.events_applied,
        }
    }

    pub fn to_snapshot(&self, ytd_year: i32) -> Snapshot {
        Snapshot::from_state(self, ytd_year)
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn shares(&self, ticker: &str) -> Decimal {
        self.holdings
            .get(ticker)
            .map(|h| h.shares)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn cost_basis(&self) -> &CostBasisTracker {
        &self.cost_basis
    }

    pub fn options(&self) -> &OptionRegistry {
        &self.options
    }

    pub fn last_event_id(&self) -> Option<u64> {
        self.last_event_id
    }
}
