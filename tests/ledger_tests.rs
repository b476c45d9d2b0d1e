use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driver_ledger::errors::RetryPolicy;
use driver_ledger::ledger::{
    InMemoryLedgerStore, LedgerStore, Mutation, SnapshotLedgerStore, MAX_ONLINE_HOURS,
};
use driver_ledger::{
    AccumulationService, DriverId, DriverTimeRecord, LedgerError, LedgerResult, PaymentCalculator,
    QueryFacade,
};
use futures::future::join_all;
use rand::Rng;
use rust_decimal::Decimal;

fn driver(id: &str) -> DriverId {
    DriverId::parse(id).unwrap()
}

fn ledger() -> (AccumulationService, QueryFacade) {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    (
        AccumulationService::new(store.clone(), RetryPolicy::default()),
        QueryFacade::new(store, PaymentCalculator::new(Decimal::new(10, 0)).unwrap()),
    )
}

#[tokio::test]
async fn accumulation_is_the_sum_of_deltas() {
    let (svc, queries) = ledger();
    let deltas: Vec<f64> = {
        let mut rng = rand::thread_rng();
        (0..20).map(|_| rng.gen_range(1..=40) as f64 * 0.25).collect()
    };

    for delta in &deltas {
        svc.add_hours(&driver("d1"), *delta).await.unwrap();
    }

    // Quarter hours are exact in binary floating point.
    let expected: f64 = deltas.iter().sum();
    assert_eq!(queries.get_current_time(&driver("d1")).await.unwrap(), expected);
}

#[tokio::test]
async fn reset_then_query_is_zero() {
    let (svc, queries) = ledger();
    svc.add_hours(&driver("d1"), 7.0).await.unwrap();
    svc.reset_hours(&driver("d1")).await.unwrap();

    assert_eq!(queries.get_current_time(&driver("d1")).await.unwrap(), 0.0);
    let quote = queries.get_payment_quote(&driver("d1")).await.unwrap();
    assert!(quote.total_payment.is_zero());
}

#[tokio::test]
async fn non_positive_deltas_are_rejected() {
    let (svc, queries) = ledger();
    svc.add_hours(&driver("d1"), 1.0).await.unwrap();

    assert!(matches!(
        svc.add_hours(&driver("d1"), -1.0).await,
        Err(LedgerError::InvalidArgument(_))
    ));
    assert!(matches!(
        svc.add_hours(&driver("d1"), 0.0).await,
        Err(LedgerError::InvalidArgument(_))
    ));
    assert_eq!(queries.get_current_time(&driver("d1")).await.unwrap(), 1.0);
}

#[tokio::test]
async fn payment_for_two_and_a_half_hours() {
    let (svc, queries) = ledger();
    svc.add_hours(&driver("d1"), 2.5).await.unwrap();

    let quote = queries.get_payment_quote(&driver("d1")).await.unwrap();
    assert_eq!(quote.total_payment, Decimal::new(2500, 2));
    assert_eq!(quote.rate_per_hour, Decimal::new(10, 0));
}

#[tokio::test]
async fn oversized_totals_are_rejected_and_payroll_stays_quotable() {
    let (svc, queries) = ledger();
    svc.add_hours(&driver("small"), 2.0).await.unwrap();
    svc.add_hours(&driver("big"), 3.0).await.unwrap();

    for delta in [1e29, MAX_ONLINE_HOURS] {
        let err = svc.add_hours(&driver("big"), delta).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
    }
    assert!(svc.add_hours(&driver("huge"), 1e29).await.is_err());

    assert_eq!(queries.get_current_time(&driver("big")).await.unwrap(), 3.0);
    assert!(queries.get_record(&driver("huge")).await.is_err());

    let summary = queries.payroll_summary().await.unwrap();
    assert_eq!(summary.drivers, 2);
    assert_eq!(summary.total_payment, Decimal::new(50, 0));
}

#[tokio::test]
async fn payment_for_unknown_driver_is_not_found() {
    let (_, queries) = ledger();
    let err = queries.get_payment_quote(&driver("ghost")).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { driver_id } if driver_id == "ghost"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_adds_lose_no_updates() {
    let (svc, queries) = ledger();
    let mut handles = vec![];

    for _ in 0..100 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.add_hours(&driver("d1"), 1.0).await
        }));
    }

    let results = join_all(handles).await;
    assert!(results.iter().all(|r| matches!(r, Ok(Ok(_)))));
    assert_eq!(queries.get_current_time(&driver("d1")).await.unwrap(), 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_on_snapshot_store_lose_no_updates() {
    let path = std::env::temp_dir().join(format!("driver-ledger-{}.json", uuid::Uuid::new_v4()));
    let store: Arc<dyn LedgerStore> = Arc::new(SnapshotLedgerStore::open(&path).await.unwrap());
    let svc = AccumulationService::new(store.clone(), RetryPolicy::default());

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let svc = svc.clone();
            let id = if i % 2 == 0 { "even" } else { "odd" };
            tokio::spawn(async move { svc.add_hours(&driver(id), 0.5).await })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let reopened = SnapshotLedgerStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(&driver("even")).await.unwrap().online_time_hours, 12.5);
    assert_eq!(reopened.get(&driver("odd")).await.unwrap().online_time_hours, 12.5);

    let _ = std::fs::remove_file(&path);
}

/// Store that reports a conflict for the first `conflicts` mutations.
struct FlakyStore {
    inner: InMemoryLedgerStore,
    conflicts: AtomicU32,
    attempts: AtomicU32,
}

impl FlakyStore {
    fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryLedgerStore::new(),
            conflicts: AtomicU32::new(conflicts),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn get(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord> {
        self.inner.get(driver_id).await
    }

    async fn upsert(&self, record: DriverTimeRecord) -> LedgerResult<()> {
        self.inner.upsert(record).await
    }

    async fn apply(
        &self,
        driver_id: &DriverId,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> LedgerResult<DriverTimeRecord> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(LedgerError::ConflictRetryable {
                driver_id: driver_id.to_string(),
            });
        }
        self.inner.apply(driver_id, mutation, now).await
    }

    async fn insert_if_absent(
        &self,
        record: DriverTimeRecord,
    ) -> LedgerResult<(DriverTimeRecord, bool)> {
        self.inner.insert_if_absent(record).await
    }

    async fn list(&self) -> LedgerResult<Vec<DriverTimeRecord>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn conflicts_are_retried_within_bound() {
    let store = Arc::new(FlakyStore::new(2));
    let svc = AccumulationService::new(
        store.clone(),
        RetryPolicy::new(3).with_backoff(Duration::ZERO),
    );

    let record = svc.add_hours(&driver("d1"), 1.0).await.unwrap();
    assert_eq!(record.online_time_hours, 1.0);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn conflicts_surface_after_bound() {
    let store = Arc::new(FlakyStore::new(10));
    let svc = AccumulationService::new(
        store.clone(),
        RetryPolicy::new(2).with_backoff(Duration::ZERO),
    );

    let err = svc.add_hours(&driver("d1"), 1.0).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert!(store.get(&driver("d1")).await.is_err());
}
