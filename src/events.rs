//! Event log data model
//!
//! `EventRecord` is the loosely-typed shape handed over by the log storage
//! collaborator. It is decoded once, at the boundary, into `Event` whose
//! `EventPayload` is a closed variant per event type, so the ledger handlers
//! match exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ReplayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Trade,
    OptionOpen,
    OptionClose,
    OptionExpire,
    OptionAssign,
    Deposit,
    Withdrawal,
    Dividend,
    PriceUpdate,
    Note,
    GoalUpdate,
    StrategyUpdate,
    InsightLog,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Trade => "TRADE",
            EventType::OptionOpen => "OPTION_OPEN",
            EventType::OptionClose => "OPTION_CLOSE",
            EventType::OptionExpire => "OPTION_EXPIRE",
            EventType::OptionAssign => "OPTION_ASSIGN",
            EventType::Deposit => "DEPOSIT",
            EventType::Withdrawal => "WITHDRAWAL",
            EventType::Dividend => "DIVIDEND",
            EventType::PriceUpdate => "PRICE_UPDATE",
            EventType::Note => "NOTE",
            EventType::GoalUpdate => "GOAL_UPDATE",
            EventType::StrategyUpdate => "STRATEGY_UPDATE",
            EventType::InsightLog => "INSIGHT_LOG",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    #[serde(alias = "buy")]
    Buy,
    #[serde(alias = "sell")]
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("BUY"),
            TradeAction::Sell => f.write_str("SELL"),
        }
    }
}

/// Option strategy as written by the user. Unknown names are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OptionStrategy {
    CoveredCall,
    CashSecuredPut,
    Other(String),
}

impl OptionStrategy {
    /// Side of the synthetic trade an assignment of this strategy produces
    pub fn assignment_action(&self) -> Option<TradeAction> {
        match self {
            OptionStrategy::CoveredCall => Some(TradeAction::Sell),
            OptionStrategy::CashSecuredPut => Some(TradeAction::Buy),
            OptionStrategy::Other(_) => None,
        }
    }
}

impl From<String> for OptionStrategy {
    fn from(s: String) -> Self {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "covered_call" => OptionStrategy::CoveredCall,
            "cash_secured_put" | "csp" => OptionStrategy::CashSecuredPut,
            _ => OptionStrategy::Other(s),
        }
    }
}

impl From<OptionStrategy> for String {
    fn from(s: OptionStrategy) -> Self {
        match s {
            OptionStrategy::CoveredCall => "covered_call".to_string(),
            OptionStrategy::CashSecuredPut => "cash_secured_put".to_string(),
            OptionStrategy::Other(name) => name,
        }
    }
}

/// Confidence label on a reason, matched case-insensitively
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Other(String),
}

impl From<String> for Confidence {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Confidence::Low,
            "medium" | "med" => Confidence::Medium,
            "high" => Confidence::High,
            _ => Confidence::Other(s),
        }
    }
}

impl From<Confidence> for String {
    fn from(c: Confidence) -> Self {
        match c {
            Confidence::Low => "low".to_string(),
            Confidence::Medium => "medium".to_string(),
            Confidence::High => "high".to_string(),
            Confidence::Other(label) => label,
        }
    }
}

/// Free-form rationale attached to an event. Never read by the ledger, so
/// its shape is not enforced: unrecognised fields are kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    #[serde(default, alias = "rationale", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Reason {
    /// Read a reason of any shape. A bare string is taken as the text; an
    /// object whose known fields have unexpected types is kept whole in
    /// `extra`.
    pub fn from_value(raw: Value) -> Option<Self> {
        match raw {
            Value::Null => None,
            Value::String(text) => Some(Reason {
                text: Some(text),
                ..Reason::default()
            }),
            Value::Object(fields) => {
                let reason = serde_json::from_value(Value::Object(fields.clone()))
                    .unwrap_or_else(|_| Reason {
                        extra: fields.into_iter().collect(),
                        ..Reason::default()
                    });
                Some(reason)
            }
            other => Some(Reason {
                extra: BTreeMap::from([("value".to_string(), other)]),
                ..Reason::default()
            }),
        }
    }
}

fn deserialize_reason<'de, D>(deserializer: D) -> Result<Option<Reason>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Reason::from_value(Value::deserialize(deserializer)?))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradePayload {
    pub ticker: String,
    pub action: TradeAction,
    pub shares: Decimal,
    pub price: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub fee: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionOpenPayload {
    pub uuid: String,
    pub ticker: String,
    pub strategy: OptionStrategy,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub contracts: u32,
    /// Total premium received, not per share
    pub premium: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionClosePayload {
    pub uuid: String,
    pub close_cost: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionExpirePayload {
    pub uuid: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionAssignPayload {
    pub uuid: String,
    pub action: TradeAction,
    /// Defaults to contracts * multiplier when absent
    #[serde(default)]
    pub shares: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositPayload {
    pub amount: Decimal,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalPayload {
    pub amount: Decimal,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DividendPayload {
    pub ticker: String,
    pub amount: Decimal,
    #[serde(default)]
    pub shares: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdatePayload {
    pub prices: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub content: String,
}

/// Typed payload, one variant per event type
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    Trade(TradePayload),
    OptionOpen(OptionOpenPayload),
    OptionClose(OptionClosePayload),
    OptionExpire(OptionExpirePayload),
    OptionAssign(OptionAssignPayload),
    Deposit(DepositPayload),
    Withdrawal(WithdrawalPayload),
    Dividend(DividendPayload),
    PriceUpdate(PriceUpdatePayload),
    Note(NotePayload),
    GoalUpdate(Value),
    StrategyUpdate(Value),
    InsightLog(Value),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Trade(_) => EventType::Trade,
            EventPayload::OptionOpen(_) => EventType::OptionOpen,
            EventPayload::OptionClose(_) => EventType::OptionClose,
            EventPayload::OptionExpire(_) => EventType::OptionExpire,
            EventPayload::OptionAssign(_) => EventType::OptionAssign,
            EventPayload::Deposit(_) => EventType::Deposit,
            EventPayload::Withdrawal(_) => EventType::Withdrawal,
            EventPayload::Dividend(_) => EventType::Dividend,
            EventPayload::PriceUpdate(_) => EventType::PriceUpdate,
            EventPayload::Note(_) => EventType::Note,
            EventPayload::GoalUpdate(_) => EventType::GoalUpdate,
            EventPayload::StrategyUpdate(_) => EventType::StrategyUpdate,
            EventPayload::InsightLog(_) => EventType::InsightLog,
        }
    }

    /// Decode and validate a raw payload for the given event type
    pub fn decode(event_id: u64, event_type: EventType, raw: Value) -> Result<Self, ReplayError> {
        let malformed = |reason: String| ReplayError::MalformedPayload {
            event_id,
            event_type: event_type.to_string(),
            reason,
        };

        let payload = match event_type {
            EventType::Trade => EventPayload::Trade(parse(raw).map_err(malformed)?),
            EventType::OptionOpen => EventPayload::OptionOpen(parse(raw).map_err(malformed)?),
            EventType::OptionClose => EventPayload::OptionClose(parse(raw).map_err(malformed)?),
            EventType::OptionExpire => EventPayload::OptionExpire(parse(raw).map_err(malformed)?),
            EventType::OptionAssign => EventPayload::OptionAssign(parse(raw).map_err(malformed)?),
            EventType::Deposit => EventPayload::Deposit(parse(raw).map_err(malformed)?),
            EventType::Withdrawal => EventPayload::Withdrawal(parse(raw).map_err(malformed)?),
            EventType::Dividend => EventPayload::Dividend(parse(raw).map_err(malformed)?),
            EventType::PriceUpdate => {
                // Accept either {"prices": {...}} or the bare ticker map
                let prices = match raw {
                    Value::Object(mut obj) if obj.contains_key("prices") => {
                        obj.remove("prices").unwrap_or(Value::Null)
                    }
                    other => other,
                };
                EventPayload::PriceUpdate(PriceUpdatePayload {
                    prices: parse(prices).map_err(malformed)?,
                })
            }
            EventType::Note => EventPayload::Note(parse(raw).map_err(malformed)?),
            EventType::GoalUpdate => EventPayload::GoalUpdate(raw),
            EventType::StrategyUpdate => EventPayload::StrategyUpdate(raw),
            EventType::InsightLog => EventPayload::InsightLog(raw),
        };

        payload.validate().map_err(malformed)?;
        Ok(payload)
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            EventPayload::Trade(t) => {
                require_ticker(&t.ticker)?;
                require_positive("shares", t.shares)?;
                require_non_negative("price", t.price)?;
                require_non_negative("total", t.total)?;
                require_non_negative("fee", t.fee)
            }
            EventPayload::OptionOpen(o) => {
                require_ticker(&o.ticker)?;
                require_uuid(&o.uuid)?;
                require_positive("strike", o.strike)?;
                require_non_negative("premium", o.premium)?;
                if o.contracts == 0 {
                    return Err("contracts must be > 0".to_string());
                }
                Ok(())
            }
            EventPayload::OptionClose(c) => {
                require_uuid(&c.uuid)?;
                require_non_negative("close_cost", c.close_cost)
            }
            EventPayload::OptionExpire(e) => require_uuid(&e.uuid),
            EventPayload::OptionAssign(a) => {
                require_uuid(&a.uuid)?;
                match a.shares {
                    Some(shares) => require_positive("shares", shares),
                    None => Ok(()),
                }
            }
            EventPayload::Deposit(d) => require_positive("amount", d.amount),
            EventPayload::Withdrawal(w) => require_positive("amount", w.amount),
            EventPayload::Dividend(d) => {
                require_ticker(&d.ticker)?;
                require_non_negative("amount", d.amount)
            }
            EventPayload::PriceUpdate(p) => {
                for (ticker, price) in &p.prices {
                    require_ticker(ticker)?;
                    require_positive("price", *price)?;
                }
                Ok(())
            }
            EventPayload::Note(_)
            | EventPayload::GoalUpdate(_)
            | EventPayload::StrategyUpdate(_)
            | EventPayload::InsightLog(_) => Ok(()),
        }
    }

    fn to_value(&self) -> Value {
        let encoded = match self {
            EventPayload::Trade(p) => serde_json::to_value(p),
            EventPayload::OptionOpen(p) => serde_json::to_value(p),
            EventPayload::OptionClose(p) => serde_json::to_value(p),
            EventPayload::OptionExpire(p) => serde_json::to_value(p),
            EventPayload::OptionAssign(p) => serde_json::to_value(p),
            EventPayload::Deposit(p) => serde_json::to_value(p),
            EventPayload::Withdrawal(p) => serde_json::to_value(p),
            EventPayload::Dividend(p) => serde_json::to_value(p),
            EventPayload::PriceUpdate(p) => serde_json::to_value(p),
            EventPayload::Note(p) => serde_json::to_value(p),
            EventPayload::GoalUpdate(v)
            | EventPayload::StrategyUpdate(v)
            | EventPayload::InsightLog(v) => Ok(v.clone()),
        };
        encoded.unwrap_or(Value::Null)
    }
}

fn parse<T: DeserializeOwned>(raw: Value) -> Result<T, String> {
    serde_json::from_value(raw).map_err(|e| e.to_string())
}

fn require_ticker(ticker: &str) -> Result<(), String> {
    if ticker.trim().is_empty() {
        return Err("ticker must not be empty".to_string());
    }
    Ok(())
}

fn require_uuid(uuid: &str) -> Result<(), String> {
    if uuid.trim().is_empty() {
        return Err("uuid must not be empty".to_string());
    }
    Ok(())
}

fn require_positive(field: &str, value: Decimal) -> Result<(), String> {
    if value <= Decimal::ZERO {
        return Err(format!("{field} must be > 0, got {value}"));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: Decimal) -> Result<(), String> {
    if value < Decimal::ZERO {
        return Err(format!("{field} must be >= 0, got {value}"));
    }
    Ok(())
}

/// Immutable log entry, validated and typed
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
    pub reason: Option<Reason>,
    pub affects_cash: bool,
    pub cash_delta: Decimal,
}

impl Event {
    /// Event with no cash effect
    pub fn new(event_id: u64, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            event_id,
            timestamp,
            payload,
            reason: None,
            affects_cash: false,
            cash_delta: Decimal::ZERO,
        }
    }

    pub fn with_cash(mut self, cash_delta: Decimal) -> Self {
        self.affects_cash = true;
        self.cash_delta = cash_delta;
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Cash actually moved by this event when accepted
    pub fn effective_cash_delta(&self) -> Decimal {
        if self.affects_cash {
            self.cash_delta
        } else {
            Decimal::ZERO
        }
    }
}

/// Raw event as stored by the log collaborator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, deserialize_with = "deserialize_reason")]
    pub reason: Option<Reason>,
    #[serde(default)]
    pub affects_cash: bool,
    #[serde(default)]
    pub cash_delta: Decimal,
}

impl TryFrom<EventRecord> for Event {
    type Error = ReplayError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let payload = EventPayload::decode(record.event_id, record.event_type, record.payload)?;
        Ok(Event {
            event_id: record.event_id,
            timestamp: record.timestamp,
            payload,
            reason: record.reason,
            affects_cash: record.affects_cash,
            cash_delta: record.cash_delta,
        })
    }
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        EventRecord {
            event_id: event.event_id,
            timestamp: event.timestamp,
            event_type: event.event_type(),
            payload: event.payload.to_value(),
            reason: event.reason.clone(),
            affects_cash: event.affects_cash,
            cash_delta: event.cash_delta,
        }
    }
}

/// Decode a whole log, stopping at the first malformed record
pub fn decode_log<I>(records: I) -> Result<Vec<Event>, ReplayError>
where
    I: IntoIterator<Item = EventRecord>,
{
    records.into_iter().map(Event::try_from).collect()
}
