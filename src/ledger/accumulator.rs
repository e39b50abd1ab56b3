//! Ledger accumulator: applies one event to the working state.
//!
//! Every handler validates before it mutates, so an event that fails leaves
//! the state exactly as it was. Cash only ever moves by the event's
//! `cash_delta`; the per-kind cash effect is checked against it and a
//! mismatch is reported as a warning. Amounts are summed with checked
//! arithmetic and a result outside the `Decimal` range is a fatal error.

use chrono::Datelike;
use rust_decimal::Decimal;
use tracing::debug;

use super::options::OptionStatus;
use super::LedgerState;
use crate::constants::ledger::{CONTRACT_MULTIPLIER, RECONCILE_TOLERANCE};
use crate::error::{ReplayError, ReplayWarning};
use crate::events::{
    DividendPayload, Event, EventPayload, OptionAssignPayload, OptionClosePayload,
    OptionExpirePayload, OptionOpenPayload, PriceUpdatePayload, TradeAction, TradePayload,
    WithdrawalPayload,
};
use crate::snapshot::{Holding, IncomeBreakdown, PriceQuote};

/// Pure inputs to a replay besides the log itself
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayOptions {
    /// Calendar year whose income is reported as year-to-date
    pub ytd_year: i32,
    pub reconcile_tolerance: Decimal,
    pub contract_multiplier: u32,
}

impl ReplayOptions {
    pub fn new(ytd_year: i32) -> Self {
        Self {
            ytd_year,
            reconcile_tolerance: RECONCILE_TOLERANCE,
            contract_multiplier: CONTRACT_MULTIPLIER,
        }
    }
}

impl LedgerState {
    /// Fold `event` into the state, returning any non-fatal warnings.
    ///
    /// On `Err` the state is unchanged.
    pub fn apply(
        &mut self,
        event: &Event,
        opts: &ReplayOptions,
    ) -> Result<Vec<ReplayWarning>, ReplayError> {
        let mut warnings = Vec::new();

        if let Some(previous) = self.last_timestamp {
            if event.timestamp < previous {
                warnings.push(ReplayWarning::BackdatedTimestamp {
                    timestamp: event.timestamp.to_rfc3339(),
                    previous: previous.to_rfc3339(),
                });
            }
        }
        if !event.affects_cash && !event.cash_delta.is_zero() {
            warnings.push(ReplayWarning::CashDeltaIgnored {
                cash_delta: event.cash_delta,
            });
        }

        let cash = self
            .cash
            .checked_add(event.effective_cash_delta())
            .ok_or_else(|| overflow(event, "cash balance"))?;

        let expected_cash = match &event.payload {
            EventPayload::Trade(trade) => self.apply_trade(event, trade, opts, &mut warnings)?,
            EventPayload::OptionOpen(open) => self.apply_option_open(event, open)?,
            EventPayload::OptionClose(close) => self.apply_option_close(event, close)?,
            EventPayload::OptionExpire(expire) => self.apply_option_expire(event, expire)?,
            EventPayload::OptionAssign(assign) => {
                self.apply_option_assign(event, assign, opts, &mut warnings)?
            }
            EventPayload::Deposit(deposit) => Some(deposit.amount),
            EventPayload::Withdrawal(withdrawal) => {
                Some(self.apply_withdrawal(withdrawal, &mut warnings))
            }
            EventPayload::Dividend(dividend) => Some(self.apply_dividend(event, dividend)?),
            EventPayload::PriceUpdate(update) => {
                self.apply_price_update(event, update, &mut warnings);
                Some(Decimal::ZERO)
            }
            EventPayload::Note(_)
            | EventPayload::GoalUpdate(_)
            | EventPayload::StrategyUpdate(_)
            | EventPayload::InsightLog(_) => Some(Decimal::ZERO),
        };

        if let Some(expected) = expected_cash {
            let actual = event.effective_cash_delta();
            if !within_tolerance(actual, expected, opts.reconcile_tolerance) {
                warnings.push(ReplayWarning::Reconciliation {
                    context: format!(
                        "cash_delta for {} event {}",
                        event.event_type(),
                        event.event_id
                    ),
                    expected,
                    actual,
                });
            }
        }

        self.cash = cash;
        self.last_event_id = Some(event.event_id);
        self.last_timestamp = Some(match self.last_timestamp {
            Some(previous) => previous.max(event.timestamp),
            None => event.timestamp,
        });
        self.events_applied += 1;

        Ok(warnings)
    }

    /// Record that `event` was seen but rejected without effect
    pub fn skip(&mut self, event: &Event) {
        self.last_event_id = Some(event.event_id);
    }

    fn apply_trade(
        &mut self,
        event: &Event,
        trade: &TradePayload,
        opts: &ReplayOptions,
        warnings: &mut Vec<ReplayWarning>,
    ) -> Result<Option<Decimal>, ReplayError> {
        let gross = trade
            .shares
            .checked_mul(trade.price)
            .ok_or_else(|| overflow(event, "trade value"))?;

        match trade.action {
            TradeAction::Buy => {
                let cost = gross
                    .checked_add(trade.fee)
                    .ok_or_else(|| overflow(event, "trade cost"))?;
                reconcile_total(trade, cost, opts, warnings);
                self.buy_shares(event, &trade.ticker, trade.shares, cost)?;
                Ok(Some(-trade.total))
            }
            TradeAction::Sell => {
                reconcile_total(trade, gross - trade.fee, opts, warnings);
                let gain = self.sell_shares(event, &trade.ticker, trade.shares, trade.total)?;
                debug!(
                    "[LEDGER] Sold {} {} realizing {}",
                    trade.shares, trade.ticker, gain
                );
                Ok(Some(trade.total))
            }
        }
    }

    fn apply_option_open(
        &mut self,
        event: &Event,
        open: &OptionOpenPayload,
    ) -> Result<Option<Decimal>, ReplayError> {
        let mut income = self.income_for(event);
        income.option_premiums = income
            .option_premiums
            .checked_add(open.premium)
            .ok_or_else(|| overflow(event, "option premium income"))?;

        self.options.open(event.event_id, open)?;
        self.set_income(event, income);
        Ok(Some(open.premium))
    }

    fn apply_option_close(
        &mut self,
        event: &Event,
        close: &OptionClosePayload,
    ) -> Result<Option<Decimal>, ReplayError> {
        let position = self
            .options
            .check_transition(&close.uuid, OptionStatus::Closed)?;
        let realized_options = self
            .realized
            .options
            .checked_add(position.premium_received - close.close_cost)
            .ok_or_else(|| overflow(event, "realized option gains"))?;
        let mut income = self.income_for(event);
        income.option_premiums = income
            .option_premiums
            .checked_sub(close.close_cost)
            .ok_or_else(|| overflow(event, "option premium income"))?;

        self.options
            .close(&close.uuid, event.event_id, close.close_cost)?;
        self.realized.options = realized_options;
        self.set_income(event, income);
        Ok(Some(-close.close_cost))
    }

    fn apply_option_expire(
        &mut self,
        event: &Event,
        expire: &OptionExpirePayload,
    ) -> Result<Option<Decimal>, ReplayError> {
        let position = self
            .options
            .check_transition(&expire.uuid, OptionStatus::Expired)?;
        let realized_options = self
            .realized
            .options
            .checked_add(position.premium_received)
            .ok_or_else(|| overflow(event, "realized option gains"))?;

        self.options.expire(&expire.uuid, event.event_id)?;
        self.realized.options = realized_options;
        Ok(Some(Decimal::ZERO))
    }

    /// Assignment trades at the strike; its cash leg is whatever the event
    /// records, so there is nothing to reconcile against.
    fn apply_option_assign(
        &mut self,
        event: &Event,
        assign: &OptionAssignPayload,
        opts: &ReplayOptions,
        warnings: &mut Vec<ReplayWarning>,
    ) -> Result<Option<Decimal>, ReplayError> {
        let position = self
            .options
            .check_transition(&assign.uuid, OptionStatus::Assigned)?
            .clone();

        let contract_shares =
            Decimal::from(position.contracts) * Decimal::from(opts.contract_multiplier);
        let shares = assign.shares.unwrap_or(contract_shares);
        if shares != contract_shares {
            warnings.push(ReplayWarning::AssignmentMismatch {
                uuid: assign.uuid.clone(),
                detail: format!("{} shares for {} contracts", shares, position.contracts),
            });
        }
        if let Some(implied) = position.strategy.assignment_action() {
            if implied != assign.action {
                warnings.push(ReplayWarning::AssignmentMismatch {
                    uuid: assign.uuid.clone(),
                    detail: format!(
                        "{} assignment on {}",
                        assign.action,
                        String::from(position.strategy.clone())
                    ),
                });
            }
        }

        let notional = shares
            .checked_mul(position.strike)
            .ok_or_else(|| overflow(event, "assignment value"))?;
        let realized_options = self
            .realized
            .options
            .checked_add(position.premium_received)
            .ok_or_else(|| overflow(event, "realized option gains"))?;

        match assign.action {
            TradeAction::Buy => self.buy_shares(event, &position.ticker, shares, notional)?,
            TradeAction::Sell => {
                self.sell_shares(event, &position.ticker, shares, notional)?;
            }
        }

        self.options.assign(&assign.uuid, event.event_id, shares)?;
        self.realized.options = realized_options;
        Ok(None)
    }

    fn apply_withdrawal(
        &mut self,
        withdrawal: &WithdrawalPayload,
        warnings: &mut Vec<ReplayWarning>,
    ) -> Decimal {
        if withdrawal.amount > self.cash {
            warnings.push(ReplayWarning::Overdraft {
                amount: withdrawal.amount,
                balance: self.cash,
            });
        }
        -withdrawal.amount
    }

    fn apply_dividend(
        &mut self,
        event: &Event,
        dividend: &DividendPayload,
    ) -> Result<Decimal, ReplayError> {
        let mut income = self.income_for(event);
        income.dividends = income
            .dividends
            .checked_add(dividend.amount)
            .ok_or_else(|| overflow(event, "dividend income"))?;

        self.set_income(event, income);
        Ok(dividend.amount)
    }

    fn apply_price_update(
        &mut self,
        event: &Event,
        update: &PriceUpdatePayload,
        warnings: &mut Vec<ReplayWarning>,
    ) {
        for (ticker, price) in &update.prices {
            if let Some(cached) = self.prices.get(ticker) {
                if cached.as_of > event.timestamp {
                    warnings.push(ReplayWarning::SupersededPrice {
                        ticker: ticker.clone(),
                        timestamp: event.timestamp.to_rfc3339(),
                        cached: cached.as_of.to_rfc3339(),
                    });
                    continue;
                }
            }
            self.prices.insert(
                ticker.clone(),
                PriceQuote {
                    price: *price,
                    as_of: event.timestamp,
                    event_id: event.event_id,
                },
            );
        }
    }

    fn buy_shares(
        &mut self,
        event: &Event,
        ticker: &str,
        shares: Decimal,
        cost: Decimal,
    ) -> Result<(), ReplayError> {
        let held = self
            .shares(ticker)
            .checked_add(shares)
            .ok_or_else(|| overflow(event, "share count"))?;
        self.cost_basis
            .record_buy(ticker, shares, cost)
            .ok_or_else(|| overflow(event, "cost basis"))?;

        self.holdings
            .insert(ticker.to_string(), Holding { shares: held });
        Ok(())
    }

    /// Remove shares at average cost and return the realized gain. Fails
    /// before touching anything when the position is too small.
    fn sell_shares(
        &mut self,
        event: &Event,
        ticker: &str,
        shares: Decimal,
        proceeds: Decimal,
    ) -> Result<Decimal, ReplayError> {
        let held = self.shares(ticker);
        if shares > held {
            return Err(ReplayError::InsufficientShares {
                event_id: event.event_id,
                ticker: ticker.to_string(),
                requested: shares,
                held,
            });
        }

        let (remaining_lot, outcome) = self
            .cost_basis
            .preview_sell(ticker, shares, proceeds)
            .ok_or_else(|| overflow(event, "cost basis"))?;
        let realized_trades = self
            .realized
            .trades
            .checked_add(outcome.realized_gain)
            .ok_or_else(|| overflow(event, "realized trade gains"))?;
        let mut income = self.income_for(event);
        income.trade_gains = income
            .trade_gains
            .checked_add(outcome.realized_gain)
            .ok_or_else(|| overflow(event, "trade gain income"))?;

        let remaining = held - shares;
        if remaining.is_zero() {
            self.holdings.remove(ticker);
        } else {
            self.holdings
                .insert(ticker.to_string(), Holding { shares: remaining });
        }
        self.cost_basis.set_lot(ticker, remaining_lot);
        self.realized.trades = realized_trades;
        self.set_income(event, income);
        Ok(outcome.realized_gain)
    }

    fn income_for(&self, event: &Event) -> IncomeBreakdown {
        self.income_by_year
            .get(&event.timestamp.year())
            .cloned()
            .unwrap_or_default()
    }

    fn set_income(&mut self, event: &Event, income: IncomeBreakdown) {
        self.income_by_year.insert(event.timestamp.year(), income);
    }
}

fn overflow(event: &Event, context: &str) -> ReplayError {
    ReplayError::ArithmeticOverflow {
        event_id: event.event_id,
        context: context.to_string(),
    }
}

/// A difference too large to represent is never within tolerance
fn within_tolerance(actual: Decimal, expected: Decimal, tolerance: Decimal) -> bool {
    actual
        .checked_sub(expected)
        .map(|diff| diff.abs() <= tolerance)
        .unwrap_or(false)
}

fn reconcile_total(
    trade: &TradePayload,
    computed: Decimal,
    opts: &ReplayOptions,
    warnings: &mut Vec<ReplayWarning>,
) {
    if !within_tolerance(trade.total, computed, opts.reconcile_tolerance) {
        warnings.push(ReplayWarning::Reconciliation {
            context: format!("{} {} total", trade.action, trade.ticker),
            expected: computed,
            actual: trade.total,
        });
    }
}
