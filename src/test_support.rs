//! Event builders shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::events::*;
use crate::ledger::ReplayOptions;

pub const YEAR: i32 = 2026;

pub fn opts() -> ReplayOptions {
    ReplayOptions::new(YEAR)
}

/// One hour per event id, starting at the beginning of `YEAR`
pub fn ts(event_id: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(YEAR, 1, 1, 0, 0, 0).unwrap() + Duration::hours(event_id as i64)
}

pub fn trade(id: u64, ticker: &str, action: TradeAction, shares: Decimal, price: Decimal) -> Event {
    let total = shares * price;
    let cash = match action {
        TradeAction::Buy => -total,
        TradeAction::Sell => total,
    };
    Event::new(
        id,
        ts(id),
        EventPayload::Trade(TradePayload {
            ticker: ticker.to_string(),
            action,
            shares,
            price,
            total,
            fee: Decimal::ZERO,
        }),
    )
    .with_cash(cash)
}

pub fn buy(id: u64, ticker: &str, shares: Decimal, price: Decimal) -> Event {
    trade(id, ticker, TradeAction::Buy, shares, price)
}

pub fn sell(id: u64, ticker: &str, shares: Decimal, price: Decimal) -> Event {
    trade(id, ticker, TradeAction::Sell, shares, price)
}

pub fn deposit(id: u64, amount: Decimal) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::Deposit(DepositPayload {
            amount,
            source: Some("payroll".to_string()),
        }),
    )
    .with_cash(amount)
}

pub fn withdrawal(id: u64, amount: Decimal) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::Withdrawal(WithdrawalPayload {
            amount,
            purpose: None,
        }),
    )
    .with_cash(-amount)
}

pub fn dividend(id: u64, ticker: &str, amount: Decimal) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::Dividend(DividendPayload {
            ticker: ticker.to_string(),
            amount,
            shares: None,
        }),
    )
    .with_cash(amount)
}

pub fn option_open(
    id: u64,
    uuid: &str,
    ticker: &str,
    strategy: OptionStrategy,
    strike: Decimal,
    contracts: u32,
    premium: Decimal,
) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::OptionOpen(OptionOpenPayload {
            uuid: uuid.to_string(),
            ticker: ticker.to_string(),
            strategy,
            strike,
            expiration: chrono::NaiveDate::from_ymd_opt(YEAR, 6, 19).unwrap(),
            contracts,
            premium,
        }),
    )
    .with_cash(premium)
}

pub fn option_close(id: u64, uuid: &str, close_cost: Decimal) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::OptionClose(OptionClosePayload {
            uuid: uuid.to_string(),
            close_cost,
        }),
    )
    .with_cash(-close_cost)
}

pub fn option_expire(id: u64, uuid: &str) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::OptionExpire(OptionExpirePayload {
            uuid: uuid.to_string(),
        }),
    )
}

pub fn option_assign(id: u64, uuid: &str, action: TradeAction, shares: Option<Decimal>) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::OptionAssign(OptionAssignPayload {
            uuid: uuid.to_string(),
            action,
            shares,
        }),
    )
}

pub fn price_update(id: u64, at: DateTime<Utc>, prices: &[(&str, Decimal)]) -> Event {
    Event::new(
        id,
        at,
        EventPayload::PriceUpdate(PriceUpdatePayload {
            prices: prices.iter().map(|(t, p)| (t.to_string(), *p)).collect(),
        }),
    )
}

pub fn note(id: u64, content: &str) -> Event {
    Event::new(
        id,
        ts(id),
        EventPayload::Note(NotePayload {
            content: content.to_string(),
        }),
    )
}

pub fn goal_update(id: u64) -> Event {
    Event::new(id, ts(id), EventPayload::GoalUpdate(json!({"target": 100000})))
}
