//! Weighted-average cost basis per ticker.
//!
//! A sell removes cost in proportion to the shares sold, so the blended
//! average is only moved by buys (including put assignments). All lot
//! arithmetic is checked; `None` means the result left the `Decimal` range.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBasisLot {
    pub total_shares: Decimal,
    pub total_cost: Decimal,
}

impl CostBasisLot {
    pub fn avg_cost(&self) -> Decimal {
        self.total_cost
            .checked_div(self.total_shares)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.total_shares.is_zero()
    }

    fn with_buy(&self, shares: Decimal, cost: Decimal) -> Option<CostBasisLot> {
        let lot = CostBasisLot {
            total_shares: self.total_shares.checked_add(shares)?,
            total_cost: self.total_cost.checked_add(cost)?,
        };
        lot.average_in_range().then_some(lot)
    }

    /// Lot left after removing `shares` at the current average, and the cost
    /// removed. Caller guarantees `shares <= total_shares`.
    fn with_sale(&self, shares: Decimal) -> Option<(CostBasisLot, Decimal)> {
        if shares >= self.total_shares {
            return Some((CostBasisLot::default(), self.total_cost));
        }

        let removed = self
            .total_cost
            .checked_mul(shares)
            .and_then(|c| c.checked_div(self.total_shares))
            .or_else(|| {
                self.total_cost
                    .checked_div(self.total_shares)?
                    .checked_mul(shares)
            })?
            .min(self.total_cost);
        let lot = CostBasisLot {
            total_shares: self.total_shares - shares,
            total_cost: (self.total_cost - removed).max(Decimal::ZERO),
        };
        lot.average_in_range().then_some((lot, removed))
    }

    fn average_in_range(&self) -> bool {
        self.is_empty() || self.total_cost.checked_div(self.total_shares).is_some()
    }
}

/// Result of removing shares from a lot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SaleOutcome {
    pub removed_cost: Decimal,
    pub realized_gain: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostBasisTracker {
    lots: BTreeMap<String, CostBasisLot>,
}

impl CostBasisTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lots(lots: BTreeMap<String, CostBasisLot>) -> Self {
        Self { lots }
    }

    /// Blend `shares` bought for `cost` into the ticker's lot. Returns `None`
    /// and leaves the lot untouched on overflow.
    pub fn record_buy(&mut self, ticker: &str, shares: Decimal, cost: Decimal) -> Option<()> {
        let lot = self
            .lots
            .get(ticker)
            .cloned()
            .unwrap_or_default()
            .with_buy(shares, cost)?;
        self.set_lot(ticker, lot);
        Some(())
    }

    /// Work out a sale without applying it: the lot that would remain and
    /// the gain `proceeds - removed cost`.
    pub fn preview_sell(
        &self,
        ticker: &str,
        shares: Decimal,
        proceeds: Decimal,
    ) -> Option<(CostBasisLot, SaleOutcome)> {
        let (remaining, removed_cost) = match self.lots.get(ticker) {
            Some(lot) => lot.with_sale(shares)?,
            None => (CostBasisLot::default(), Decimal::ZERO),
        };
        let outcome = SaleOutcome {
            removed_cost,
            realized_gain: proceeds.checked_sub(removed_cost)?,
        };
        Some((remaining, outcome))
    }

    /// Remove sold shares at the average cost. A fully sold ticker is
    /// dropped from the tracker.
    pub fn record_sell(
        &mut self,
        ticker: &str,
        shares: Decimal,
        proceeds: Decimal,
    ) -> Option<SaleOutcome> {
        let (remaining, outcome) = self.preview_sell(ticker, shares, proceeds)?;
        self.set_lot(ticker, remaining);
        Some(outcome)
    }

    /// Replace the ticker's lot; an empty lot removes the ticker
    pub fn set_lot(&mut self, ticker: &str, lot: CostBasisLot) {
        if lot.is_empty() {
            self.lots.remove(ticker);
        } else {
            self.lots.insert(ticker.to_string(), lot);
        }
    }

    pub fn lot(&self, ticker: &str) -> Option<&CostBasisLot> {
        self.lots.get(ticker)
    }

    pub fn avg_cost(&self, ticker: &str) -> Decimal {
        self.lots
            .get(ticker)
            .map(CostBasisLot::avg_cost)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn lots(&self) -> &BTreeMap<String, CostBasisLot> {
        &self.lots
    }
}
