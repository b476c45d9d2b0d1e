use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::{DriverId, DriverTimeRecord};

/// Hourly rate used when the configuration does not name one: 10.00 per hour.
pub const DEFAULT_RATE_PER_HOUR: Decimal = Decimal::from_parts(1000, 0, 0, false, 2);

/// Highest accepted hourly rate. Together with
/// [`MAX_ONLINE_HOURS`](crate::ledger::MAX_ONLINE_HOURS) it bounds every
/// payment well inside `Decimal` range.
pub const MAX_RATE_PER_HOUR: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Payment derived from a driver's online time. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQuote {
    pub driver_id: DriverId,
    #[serde(rename = "onlineTime")]
    pub online_time_hours: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate_per_hour: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_payment: Decimal,
}

/// Rounds half-up to cents. Amounts here are never negative, so midpoint
/// away from zero is the same as half-up.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn check_rate(rate_per_hour: Decimal) -> LedgerResult<()> {
    if rate_per_hour.is_sign_negative() && !rate_per_hour.is_zero() {
        return Err(LedgerError::invalid(format!(
            "rate per hour must not be negative, got {rate_per_hour}"
        )));
    }
    if rate_per_hour > MAX_RATE_PER_HOUR {
        return Err(LedgerError::invalid(format!(
            "rate per hour must not exceed {MAX_RATE_PER_HOUR}, got {rate_per_hour}"
        )));
    }
    Ok(())
}

/// Fails only on an invalid rate for any record the ledger can hold.
pub fn compute_payment(record: &DriverTimeRecord, rate_per_hour: Decimal) -> LedgerResult<PaymentQuote> {
    check_rate(rate_per_hour)?;

    let hours = Decimal::from_f64(record.online_time_hours).ok_or_else(|| {
        LedgerError::invalid(format!(
            "online time {} of driver {} is not representable",
            record.online_time_hours, record.driver_id
        ))
    })?;
    let total = hours.checked_mul(rate_per_hour).ok_or_else(|| {
        LedgerError::invalid(format!(
            "payment for driver {} overflows",
            record.driver_id
        ))
    })?;

    Ok(PaymentQuote {
        driver_id: record.driver_id.clone(),
        online_time_hours: record.online_time_hours,
        rate_per_hour,
        total_payment: round2(total),
    })
}

/// Rate policy bound to a validated hourly rate.
#[derive(Debug, Clone, Copy)]
pub struct PaymentCalculator {
    rate_per_hour: Decimal,
}

impl PaymentCalculator {
    pub fn new(rate_per_hour: Decimal) -> LedgerResult<Self> {
        check_rate(rate_per_hour)?;
        Ok(Self { rate_per_hour })
    }

    pub fn rate_per_hour(&self) -> Decimal {
        self.rate_per_hour
    }

    pub fn quote(&self, record: &DriverTimeRecord) -> LedgerResult<PaymentQuote> {
        compute_payment(record, self.rate_per_hour)
    }
}

impl Default for PaymentCalculator {
    fn default() -> Self {
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
        }
    }
}
