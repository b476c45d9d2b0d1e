use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use super::{DriverId, DriverTimeRecord, LedgerStore};
use crate::billing::{PaymentCalculator, PaymentQuote};
use crate::errors::LedgerResult;

/// Aggregate of every driver's payment quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollSummary {
    pub drivers: usize,
    pub total_online_hours: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_payment: Decimal,
    pub quotes: Vec<PaymentQuote>,
}

/// Read-only views over the ledger. Holds no mutation capability.
#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<dyn LedgerStore>,
    calculator: PaymentCalculator,
}

impl QueryFacade {
    pub fn new(store: Arc<dyn LedgerStore>, calculator: PaymentCalculator) -> Self {
        Self { store, calculator }
    }

    pub fn rate_per_hour(&self) -> Decimal {
        self.calculator.rate_per_hour()
    }

    pub async fn get_record(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord> {
        self.store.get(driver_id).await
    }

    pub async fn get_current_time(&self, driver_id: &DriverId) -> LedgerResult<f64> {
        Ok(self.store.get(driver_id).await?.online_time_hours)
    }

    pub async fn get_payment_quote(&self, driver_id: &DriverId) -> LedgerResult<PaymentQuote> {
        let record = self.store.get(driver_id).await?;
        self.calculator.quote(&record)
    }

    /// The total is the sum of the already-rounded per-driver payments, so it
    /// always matches what the individual quotes show.
    pub async fn payroll_summary(&self) -> LedgerResult<PayrollSummary> {
        let quotes = self
            .store
            .list()
            .await?
            .iter()
            .map(|record| self.calculator.quote(record))
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(PayrollSummary {
            drivers: quotes.len(),
            total_online_hours: quotes.iter().map(|q| q.online_time_hours).sum(),
            total_payment: quotes.iter().map(|q| q.total_payment).sum(),
            quotes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LedgerError, RetryPolicy};
    use crate::ledger::{AccumulationService, InMemoryLedgerStore};

    fn setup(rate: Decimal) -> (AccumulationService, QueryFacade) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        (
            AccumulationService::new(store.clone(), RetryPolicy::default()),
            QueryFacade::new(store, PaymentCalculator::new(rate).unwrap()),
        )
    }

    fn driver(id: &str) -> DriverId {
        DriverId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn quote_reflects_current_time() {
        let (svc, queries) = setup(Decimal::new(10, 0));
        svc.add_hours(&driver("d1"), 2.5).await.unwrap();

        assert_eq!(queries.get_current_time(&driver("d1")).await.unwrap(), 2.5);
        let quote = queries.get_payment_quote(&driver("d1")).await.unwrap();
        assert_eq!(quote.total_payment, Decimal::new(25, 0));

        svc.reset_hours(&driver("d1")).await.unwrap();
        let quote = queries.get_payment_quote(&driver("d1")).await.unwrap();
        assert_eq!(quote.online_time_hours, 0.0);
        assert!(quote.total_payment.is_zero());
    }

    #[tokio::test]
    async fn unknown_driver_is_not_found_not_zero() {
        let (_, queries) = setup(Decimal::new(10, 0));
        assert_eq!(
            queries.get_payment_quote(&driver("ghost")).await.unwrap_err(),
            LedgerError::not_found("ghost")
        );
        assert!(queries.get_current_time(&driver("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn repeated_queries_do_not_mutate() {
        let (svc, queries) = setup(Decimal::new(10, 0));
        let written = svc.add_hours(&driver("d1"), 1.0).await.unwrap();

        for _ in 0..3 {
            queries.get_payment_quote(&driver("d1")).await.unwrap();
        }
        assert_eq!(queries.get_record(&driver("d1")).await.unwrap(), written);
    }

    #[tokio::test]
    async fn payroll_sums_rounded_quotes() {
        let (svc, queries) = setup(Decimal::new(12345, 3));
        svc.add_hours(&driver("a"), 1.0).await.unwrap();
        svc.add_hours(&driver("b"), 1.0).await.unwrap();
        svc.register_driver(&driver("c")).await.unwrap();

        let summary = queries.payroll_summary().await.unwrap();
        assert_eq!(summary.drivers, 3);
        assert_eq!(summary.total_online_hours, 2.0);
        // 12.345 rounds to 12.35 per driver
        assert_eq!(summary.total_payment, Decimal::new(2470, 2));
        assert_eq!(summary.quotes[2].driver_id, driver("c"));
    }
}
