use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{DriverId, DriverTimeRecord, LedgerStore, Mutation, PositiveHours};
use crate::errors::{LedgerResult, RetryPolicy};

/// Enforces the add/reset contract on top of a [`LedgerStore`].
#[derive(Clone)]
pub struct AccumulationService {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

impl AccumulationService {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    #[instrument(skip(self, driver_id), fields(driver_id = %driver_id))]
    pub async fn add_hours(&self, driver_id: &DriverId, delta_hours: f64) -> LedgerResult<DriverTimeRecord> {
        let delta = PositiveHours::new(delta_hours).inspect_err(|e| {
            warn!(error = %e, "Rejected online time increment");
        })?;

        let record = self.mutate(driver_id, Mutation::AddHours(delta)).await?;
        info!(
            delta_hours,
            online_time_hours = record.online_time_hours,
            "Added online time"
        );
        Ok(record)
    }

    #[instrument(skip(self, driver_id), fields(driver_id = %driver_id))]
    pub async fn reset_hours(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord> {
        let record = self.mutate(driver_id, Mutation::Reset).await?;
        info!("Reset online time");
        Ok(record)
    }

    /// Eagerly creates a zero record. Registering a known driver returns its
    /// current record untouched.
    #[instrument(skip(self, driver_id), fields(driver_id = %driver_id))]
    pub async fn register_driver(&self, driver_id: &DriverId) -> LedgerResult<(DriverTimeRecord, bool)> {
        let store = &self.store;
        let (record, created) = self
            .retry
            .run(move || store.insert_if_absent(DriverTimeRecord::new(driver_id.clone(), Utc::now())))
            .await?;
        if created {
            info!("Registered driver in ledger");
        }
        Ok((record, created))
    }

    async fn mutate(&self, driver_id: &DriverId, mutation: Mutation) -> LedgerResult<DriverTimeRecord> {
        let store = &self.store;
        self.retry
            .run(move || store.apply(driver_id, mutation, Utc::now()))
            .await
    }
}
