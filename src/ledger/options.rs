//! Option registry: open positions keyed by their uuid.
//!
//! Positions live in an arena (`Vec`) in opening order with a uuid index on
//! the side. Lifecycle is OPEN -> {CLOSED, EXPIRED, ASSIGNED}; terminal
//! states never transition again.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReplayError;
use crate::events::{OptionOpenPayload, OptionStrategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionStatus {
    Open,
    Closed,
    Expired,
    Assigned,
}

impl OptionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptionStatus::Open)
    }
}

impl fmt::Display for OptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionStatus::Open => "OPEN",
            OptionStatus::Closed => "CLOSED",
            OptionStatus::Expired => "EXPIRED",
            OptionStatus::Assigned => "ASSIGNED",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionPosition {
    pub uuid: String,
    pub ticker: String,
    pub strategy: OptionStrategy,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub contracts: u32,
    pub premium_received: Decimal,
    pub opening_event_id: u64,
    pub status: OptionStatus,

    /// Event that moved the position into its terminal state
    pub closing_event_id: Option<u64>,
    pub close_cost: Option<Decimal>,
    pub assigned_shares: Option<Decimal>,

    /// Set once terminal: premium less any buy-back cost
    pub realized_gain: Option<Decimal>,
}

impl OptionPosition {
    pub fn is_open(&self) -> bool {
        self.status == OptionStatus::Open
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionRegistry {
    positions: Vec<OptionPosition>,
    index: BTreeMap<String, usize>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from positions in opening order
    pub fn from_positions(positions: Vec<OptionPosition>) -> Self {
        let index = positions
            .iter()
            .enumerate()
            .map(|(slot, pos)| (pos.uuid.clone(), slot))
            .collect();
        Self { positions, index }
    }

    pub fn get(&self, uuid: &str) -> Option<&OptionPosition> {
        self.index.get(uuid).map(|&slot| &self.positions[slot])
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.index.contains_key(uuid)
    }

    pub fn positions(&self) -> &[OptionPosition] {
        &self.positions
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &OptionPosition> {
        self.positions.iter().filter(|p| p.is_open())
    }

    /// Register a newly sold option
    pub fn open(
        &mut self,
        event_id: u64,
        payload: &OptionOpenPayload,
    ) -> Result<&OptionPosition, ReplayError> {
        if self.contains(&payload.uuid) {
            return Err(ReplayError::DuplicateOption {
                uuid: payload.uuid.clone(),
            });
        }

        let slot = self.positions.len();
        self.positions.push(OptionPosition {
            uuid: payload.uuid.clone(),
            ticker: payload.ticker.clone(),
            strategy: payload.strategy.clone(),
            strike: payload.strike,
            expiration: payload.expiration,
            contracts: payload.contracts,
            premium_received: payload.premium,
            opening_event_id: event_id,
            status: OptionStatus::Open,
            closing_event_id: None,
            close_cost: None,
            assigned_shares: None,
            realized_gain: None,
        });
        self.index.insert(payload.uuid.clone(), slot);
        debug!("[OPTIONS] Opened {} on {}", payload.uuid, payload.ticker);

        Ok(&self.positions[slot])
    }

    /// Check that `uuid` may move to `to` without changing anything
    pub fn check_transition(
        &self,
        uuid: &str,
        to: OptionStatus,
    ) -> Result<&OptionPosition, ReplayError> {
        let pos = self.get(uuid).ok_or_else(|| ReplayError::UnknownOption {
            uuid: uuid.to_string(),
        })?;

        if pos.status != OptionStatus::Open || to == OptionStatus::Open {
            return Err(ReplayError::InvalidTransition {
                uuid: uuid.to_string(),
                from: pos.status,
                to,
            });
        }
        Ok(pos)
    }

    /// Buy back an open option. Returns the realized gain.
    pub fn close(
        &mut self,
        uuid: &str,
        event_id: u64,
        close_cost: Decimal,
    ) -> Result<Decimal, ReplayError> {
        let pos = self.transition(uuid, OptionStatus::Closed, event_id)?;
        let gain = pos.premium_received - close_cost;
        pos.close_cost = Some(close_cost);
        pos.realized_gain = Some(gain);
        Ok(gain)
    }

    /// Let an open option lapse. The whole premium is realized.
    pub fn expire(&mut self, uuid: &str, event_id: u64) -> Result<Decimal, ReplayError> {
        let pos = self.transition(uuid, OptionStatus::Expired, event_id)?;
        let gain = pos.premium_received;
        pos.realized_gain = Some(gain);
        Ok(gain)
    }

    /// Mark an open option assigned. The synthetic trade is the caller's job.
    pub fn assign(
        &mut self,
        uuid: &str,
        event_id: u64,
        shares: Decimal,
    ) -> Result<Decimal, ReplayError> {
        let pos = self.transition(uuid, OptionStatus::Assigned, event_id)?;
        let gain = pos.premium_received;
        pos.assigned_shares = Some(shares);
        pos.realized_gain = Some(gain);
        Ok(gain)
    }

    fn transition(
        &mut self,
        uuid: &str,
        to: OptionStatus,
        event_id: u64,
    ) -> Result<&mut OptionPosition, ReplayError> {
        self.check_transition(uuid, to)?;
        let slot = self.index[uuid];
        let pos = &mut self.positions[slot];
        pos.status = to;
        pos.closing_event_id = Some(event_id);
        debug!("[OPTIONS] {} -> {} at event {}", uuid, to, event_id);
        Ok(pos)
    }
}
