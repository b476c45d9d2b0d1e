//! Per-driver online-time ledger.
//!
//! A [`DriverTimeRecord`] only ever changes through a [`Mutation`]: adding a
//! strictly positive number of hours, or resetting to zero. Stores apply
//! mutations atomically per driver, services enforce the add/reset contract
//! and the query facade exposes read-only views.

pub mod query;
pub mod service;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};

pub use query::{PayrollSummary, QueryFacade};
pub use service::AccumulationService;
pub use store::{InMemoryLedgerStore, LedgerStore, SnapshotLedgerStore};

/// Largest total a driver may accumulate (roughly 114,000 years online).
/// Keeps every stored total exactly quotable at any accepted rate.
pub const MAX_ONLINE_HOURS: f64 = 1.0e9;

/// Opaque, stable driver identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Ids are taken verbatim; blank ids and ids with surrounding
    /// whitespace are rejected rather than normalized.
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        if raw.trim().is_empty() {
            return Err(LedgerError::invalid("driver id must not be empty"));
        }
        if raw.trim() != raw {
            return Err(LedgerError::invalid(format!(
                "driver id {raw:?} must not have surrounding whitespace"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finite, strictly positive number of hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositiveHours(f64);

impl PositiveHours {
    pub fn new(hours: f64) -> LedgerResult<Self> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(LedgerError::invalid(format!(
                "hours must be a positive number, got {hours}"
            )));
        }
        Ok(Self(hours))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    AddHours(PositiveHours),
    Reset,
}

impl Mutation {
    /// Whether applying this mutation to an unknown driver creates its record.
    pub fn creates_record(&self) -> bool {
        matches!(self, Mutation::AddHours(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTimeRecord {
    pub driver_id: DriverId,
    pub online_time_hours: f64,
    pub last_updated: DateTime<Utc>,
}

impl DriverTimeRecord {
    pub fn new(driver_id: DriverId, now: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            online_time_hours: 0.0,
            last_updated: now,
        }
    }

    /// Applies `mutation` in place. On error the record is left untouched.
    pub fn apply(&mut self, mutation: Mutation, now: DateTime<Utc>) -> LedgerResult<()> {
        match mutation {
            Mutation::AddHours(delta) => {
                let total = self.online_time_hours + delta.get();
                if !total.is_finite() || total > MAX_ONLINE_HOURS {
                    return Err(LedgerError::invalid(format!(
                        "adding {} hours to driver {} exceeds the {MAX_ONLINE_HOURS} hour limit",
                        delta.get(),
                        self.driver_id
                    )));
                }
                self.online_time_hours = total;
            }
            Mutation::Reset => {
                self.online_time_hours = 0.0;
            }
        }
        self.last_updated = now;
        Ok(())
    }
}
