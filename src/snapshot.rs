//! Portfolio snapshot handed to API, CLI and visualization consumers.
//!
//! A snapshot is built once at the end of a reconstruction and is read-only
//! afterwards; a newer reconstruction produces a new snapshot. It can be
//! serialized and later passed back as the starting point of an incremental
//! replay.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::cost_basis::CostBasisLot;
use crate::ledger::options::OptionPosition;
use crate::ledger::LedgerState;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub shares: Decimal,
}

/// Latest known market price for a ticker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
    pub event_id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnl {
    /// Share sales, including call assignments
    pub trades: Decimal,
    /// Closed, expired and assigned options
    pub options: Decimal,
}

impl RealizedPnl {
    pub fn total(&self) -> Decimal {
        self.trades.saturating_add(self.options)
    }
}

/// Income attributed to one calendar year, by event timestamp
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomeBreakdown {
    pub trade_gains: Decimal,
    /// Premiums received less buy-back costs paid in the year
    pub option_premiums: Decimal,
    pub dividends: Decimal,
}

impl IncomeBreakdown {
    pub fn total(&self) -> Decimal {
        self.trade_gains
            .saturating_add(self.option_premiums)
            .saturating_add(self.dividends)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub shares: Decimal,
    pub avg_cost: Decimal,
    pub cost_basis: Decimal,
    pub last_price: Option<Decimal>,
    /// `None` without a price, or when the value is out of `Decimal` range
    pub market_value: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub(crate) as_of_event_id: Option<u64>,
    pub(crate) latest_timestamp: Option<DateTime<Utc>>,
    pub(crate) events_applied: u64,
    pub(crate) cash_balance: Decimal,
    pub(crate) holdings: BTreeMap<String, Holding>,
    pub(crate) cost_basis: BTreeMap<String, CostBasisLot>,
    pub(crate) options: Vec<OptionPosition>,
    pub(crate) latest_prices: BTreeMap<String, PriceQuote>,
    pub(crate) realized: RealizedPnl,
    pub(crate) income_by_year: BTreeMap<i32, IncomeBreakdown>,
    pub(crate) ytd_year: i32,
    pub(crate) ytd_income: Decimal,
    pub(crate) valuations: BTreeMap<String, PositionValuation>,
}

impl Snapshot {
    pub(crate) fn from_state(state: &LedgerState, ytd_year: i32) -> Self {
        let holdings = state.holdings.clone();
        let latest_prices = state.prices.clone();

        let valuations = holdings
            .iter()
            .map(|(ticker, holding)| {
                let lot = state.cost_basis.lot(ticker).cloned().unwrap_or_default();
                let last_price = latest_prices.get(ticker).map(|q| q.price);
                let market_value = last_price.and_then(|p| p.checked_mul(holding.shares));
                let valuation = PositionValuation {
                    shares: holding.shares,
                    avg_cost: lot.avg_cost(),
                    cost_basis: lot.total_cost,
                    last_price,
                    market_value,
                    unrealized_pnl: market_value.and_then(|mv| mv.checked_sub(lot.total_cost)),
                };
                (ticker.clone(), valuation)
            })
            .collect();

        let ytd_income = state
            .income_by_year
            .get(&ytd_year)
            .map(IncomeBreakdown::total)
            .unwrap_or(Decimal::ZERO);

        Self {
            as_of_event_id: state.last_event_id,
            latest_timestamp: state.last_timestamp,
            events_applied: state.events_applied,
            cash_balance: state.cash,
            holdings,
            cost_basis: state.cost_basis.lots().clone(),
            options: state.options.positions().to_vec(),
            latest_prices,
            realized: state.realized.clone(),
            income_by_year: state.income_by_year.clone(),
            ytd_year,
            ytd_income,
            valuations,
        }
    }

    /// Last event folded into this snapshot, accepted or skipped
    pub fn as_of_event_id(&self) -> Option<u64> {
        self.as_of_event_id
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.latest_timestamp
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    pub fn holdings(&self) -> &BTreeMap<String, Holding> {
        &self.holdings
    }

    pub fn shares(&self, ticker: &str) -> Decimal {
        self.holdings
            .get(ticker)
            .map(|h| h.shares)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn cost_basis(&self) -> &BTreeMap<String, CostBasisLot> {
        &self.cost_basis
    }

    pub fn avg_cost(&self, ticker: &str) -> Option<Decimal> {
        self.cost_basis.get(ticker).map(CostBasisLot::avg_cost)
    }

    /// All option positions in opening order, open and historical
    pub fn options(&self) -> &[OptionPosition] {
        &self.options
    }

    pub fn option(&self, uuid: &str) -> Option<&OptionPosition> {
        self.options.iter().find(|p| p.uuid == uuid)
    }

    pub fn open_options(&self) -> impl Iterator<Item = &OptionPosition> {
        self.options.iter().filter(|p| p.is_open())
    }

    pub fn latest_prices(&self) -> &BTreeMap<String, PriceQuote> {
        &self.latest_prices
    }

    pub fn realized(&self) -> &RealizedPnl {
        &self.realized
    }

    pub fn income_by_year(&self) -> &BTreeMap<i32, IncomeBreakdown> {
        &self.income_by_year
    }

    pub fn income_for_year(&self, year: i32) -> Decimal {
        self.income_by_year
            .get(&year)
            .map(IncomeBreakdown::total)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn ytd_year(&self) -> i32 {
        self.ytd_year
    }

    pub fn ytd_income(&self) -> Decimal {
        self.ytd_income
    }

    pub fn valuations(&self) -> &BTreeMap<String, PositionValuation> {
        &self.valuations
    }

    /// Unrealized P&L over holdings that have a known price
    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.valuations
            .values()
            .filter_map(|v| v.unrealized_pnl)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn market_value(&self) -> Decimal {
        self.valuations
            .values()
            .filter_map(|v| v.market_value)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Cash plus priced holdings
    pub fn net_worth(&self) -> Decimal {
        self.cash_balance.saturating_add(self.market_value())
    }
}
