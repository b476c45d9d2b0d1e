use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{DriverId, DriverTimeRecord, Mutation, MAX_ONLINE_HOURS};
use crate::errors::{LedgerError, LedgerResult};

/// Key-value persistence for driver records.
///
/// `apply` is the only mutation path the services use: implementations must
/// run the read-modify-write atomically per driver. A store backed by
/// optimistic concurrency may return [`LedgerError::ConflictRetryable`]
/// instead of blocking.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord>;

    async fn upsert(&self, record: DriverTimeRecord) -> LedgerResult<()>;

    async fn apply(
        &self,
        driver_id: &DriverId,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> LedgerResult<DriverTimeRecord>;

    /// Returns the stored record and whether it was created by this call.
    async fn insert_if_absent(
        &self,
        record: DriverTimeRecord,
    ) -> LedgerResult<(DriverTimeRecord, bool)>;

    async fn list(&self) -> LedgerResult<Vec<DriverTimeRecord>>;
}

/// Computes the record that `mutation` produces without storing it.
fn next_record(
    current: Option<&DriverTimeRecord>,
    driver_id: &DriverId,
    mutation: Mutation,
    now: DateTime<Utc>,
) -> LedgerResult<DriverTimeRecord> {
    let mut next = match current {
        Some(record) => record.clone(),
        None if mutation.creates_record() => {
            debug!(driver_id = %driver_id, "Creating ledger record on first accumulation");
            DriverTimeRecord::new(driver_id.clone(), now)
        }
        None => return Err(LedgerError::not_found(driver_id)),
    };
    next.apply(mutation, now)?;
    Ok(next)
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    records: DashMap<DriverId, DriverTimeRecord>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_records(records: Vec<DriverTimeRecord>) -> Self {
        let map = DashMap::with_capacity(records.len());
        for record in records {
            map.insert(record.driver_id.clone(), record);
        }
        Self { records: map }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn snapshot(&self) -> Vec<DriverTimeRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        records
    }

    /// Current contents with `candidate` in place of its driver's record.
    fn snapshot_with(&self, candidate: &DriverTimeRecord) -> Vec<DriverTimeRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.key() != &candidate.driver_id)
            .map(|r| r.value().clone())
            .collect();
        records.push(candidate.clone());
        records.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        records
    }

    fn current(&self, driver_id: &DriverId) -> Option<DriverTimeRecord> {
        self.records.get(driver_id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord> {
        self.records
            .get(driver_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LedgerError::not_found(driver_id))
    }

    async fn upsert(&self, record: DriverTimeRecord) -> LedgerResult<()> {
        self.records.insert(record.driver_id.clone(), record);
        Ok(())
    }

    async fn apply(
        &self,
        driver_id: &DriverId,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> LedgerResult<DriverTimeRecord> {
        // The entry guard holds the shard write lock for the whole update.
        match self.records.entry(driver_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let next = next_record(Some(occupied.get()), driver_id, mutation, now)?;
                occupied.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                let next = next_record(None, driver_id, mutation, now)?;
                vacant.insert(next.clone());
                Ok(next)
            }
        }
    }

    async fn insert_if_absent(
        &self,
        record: DriverTimeRecord,
    ) -> LedgerResult<(DriverTimeRecord, bool)> {
        match self.records.entry(record.driver_id.clone()) {
            Entry::Occupied(occupied) => Ok((occupied.get().clone(), false)),
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
                Ok((record, true))
            }
        }
    }

    async fn list(&self) -> LedgerResult<Vec<DriverTimeRecord>> {
        Ok(self.snapshot())
    }
}

/// In-memory store backed by a JSON snapshot file.
///
/// Every mutation is written to disk before it becomes visible in memory, so
/// a failed write leaves both the file and the in-memory state unchanged.
/// Mutations are serialized by `write_lock`; reads never wait on it.
#[derive(Debug)]
pub struct SnapshotLedgerStore {
    inner: InMemoryLedgerStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotLedgerStore {
    pub async fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        let inner = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let records: Vec<DriverTimeRecord> = serde_json::from_slice(&bytes)?;
                if let Some(bad) = records.iter().find(|r| {
                    !r.online_time_hours.is_finite()
                        || r.online_time_hours < 0.0
                        || r.online_time_hours > MAX_ONLINE_HOURS
                }) {
                    return Err(LedgerError::Storage(format!(
                        "snapshot holds invalid online time for driver {}",
                        bad.driver_id
                    )));
                }
                info!(path = %path.display(), drivers = records.len(), "Loaded ledger snapshot");
                InMemoryLedgerStore::from_records(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No ledger snapshot yet, starting empty");
                InMemoryLedgerStore::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Writes `candidate` to disk, then publishes it in memory.
    /// Callers must hold `write_lock`.
    async fn commit(&self, candidate: DriverTimeRecord) -> LedgerResult<DriverTimeRecord> {
        self.write(&self.inner.snapshot_with(&candidate)).await?;
        self.inner
            .records
            .insert(candidate.driver_id.clone(), candidate.clone());
        Ok(candidate)
    }

    async fn write(&self, records: &[DriverTimeRecord]) -> LedgerResult<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");

        let written = async {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        written.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Failed to write ledger snapshot");
            LedgerError::from(e)
        })
    }
}

#[async_trait]
impl LedgerStore for SnapshotLedgerStore {
    async fn get(&self, driver_id: &DriverId) -> LedgerResult<DriverTimeRecord> {
        self.inner.get(driver_id).await
    }

    async fn upsert(&self, record: DriverTimeRecord) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;
        self.commit(record).await?;
        Ok(())
    }

    async fn apply(
        &self,
        driver_id: &DriverId,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> LedgerResult<DriverTimeRecord> {
        let _guard = self.write_lock.lock().await;
        let current = self.inner.current(driver_id);
        let next = next_record(current.as_ref(), driver_id, mutation, now)?;
        self.commit(next).await
    }

    async fn insert_if_absent(
        &self,
        record: DriverTimeRecord,
    ) -> LedgerResult<(DriverTimeRecord, bool)> {
        let _guard = self.write_lock.lock().await;
        match self.inner.current(&record.driver_id) {
            Some(existing) => Ok((existing, false)),
            None => Ok((self.commit(record).await?, true)),
        }
    }

    async fn list(&self) -> LedgerResult<Vec<DriverTimeRecord>> {
        self.inner.list().await
    }
}
