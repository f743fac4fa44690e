//! In-process handle on one named lock record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tenure_core::{AppError, AppResult, NonEmptyString};
use tenure_domain::{LockName, LockRecord, LockRecordSnapshot, VersionToken};

use crate::election_ports::LockRecordStore;

/// Handle on one lock record in a [`LockRecordStore`].
///
/// Remembers the last snapshot it read or wrote. Performs no retries; every
/// store call is bounded by the operation timeout and reported as
/// `AppError::Unavailable` when it elapses.
pub struct LockHandle {
    store: Arc<dyn LockRecordStore>,
    lock: LockName,
    operation_timeout: Duration,
    observed: Option<LockRecordSnapshot>,
}

impl LockHandle {
    /// Creates a handle for one lock record.
    #[must_use]
    pub fn new(
        store: Arc<dyn LockRecordStore>,
        lock: LockName,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            operation_timeout,
            observed: None,
        }
    }

    /// Returns the lock name.
    #[must_use]
    pub fn lock(&self) -> &LockName {
        &self.lock
    }

    /// Returns the last observed version token.
    #[must_use]
    pub fn observed_version(&self) -> Option<&VersionToken> {
        self.observed.as_ref().map(|snapshot| &snapshot.version)
    }

    /// Reads the current record.
    pub async fn read(&mut self) -> AppResult<LockRecordSnapshot> {
        let snapshot = self.bounded("read", self.store.read(&self.lock)).await?;
        self.observed = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Creates the record with `identity` as its first holder.
    pub async fn create(
        &mut self,
        identity: &NonEmptyString,
        now: DateTime<Utc>,
        lease_duration_seconds: u32,
    ) -> AppResult<LockRecordSnapshot> {
        let record = LockRecord::first_claim(identity, now, lease_duration_seconds);
        let version = self
            .bounded("create", self.store.create(&self.lock, &record))
            .await?;

        let snapshot = LockRecordSnapshot { record, version };
        self.observed = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Writes `record` if `expected_version` is still the store's version.
    pub async fn try_update(
        &mut self,
        expected_version: &VersionToken,
        record: LockRecord,
    ) -> AppResult<LockRecordSnapshot> {
        let version = self
            .bounded(
                "conditional write",
                self.store
                    .conditional_write(&self.lock, expected_version, &record),
            )
            .await?;

        let snapshot = LockRecordSnapshot { record, version };
        self.observed = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        future: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.operation_timeout, future)
            .await
            .map_err(|_| {
                AppError::Unavailable(format!(
                    "lock {operation} for '{}' timed out after {:?}",
                    self.lock, self.operation_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tenure_core::{AppError, AppResult, NonEmptyString};
    use tenure_domain::{LockName, LockRecord, LockRecordSnapshot, VersionToken};
    use tokio::sync::Mutex;

    use super::LockHandle;
    use crate::election_ports::LockRecordStore;

    #[derive(Default)]
    struct SingleRecordStore {
        current: Mutex<Option<LockRecordSnapshot>>,
        stall: bool,
    }

    #[async_trait]
    impl LockRecordStore for SingleRecordStore {
        async fn read(&self, lock: &LockName) -> AppResult<LockRecordSnapshot> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            self.current
                .lock()
                .await
                .clone()
                .ok_or_else(|| AppError::NotFound(format!("lock '{lock}'")))
        }

        async fn create(&self, lock: &LockName, record: &LockRecord) -> AppResult<VersionToken> {
            let mut current = self.current.lock().await;
            if current.is_some() {
                return Err(AppError::AlreadyExists(format!("lock '{lock}'")));
            }
            let version = VersionToken::new("1");
            *current = Some(LockRecordSnapshot {
                record: record.clone(),
                version: version.clone(),
            });
            Ok(version)
        }

        async fn conditional_write(
            &self,
            lock: &LockName,
            expected_version: &VersionToken,
            record: &LockRecord,
        ) -> AppResult<VersionToken> {
            let mut current = self.current.lock().await;
            match current.as_ref() {
                Some(snapshot) if &snapshot.version == expected_version => {
                    let next = snapshot.version.as_str().parse::<u64>().unwrap_or(0) + 1;
                    let version = VersionToken::new(next.to_string());
                    *current = Some(LockRecordSnapshot {
                        record: record.clone(),
                        version: version.clone(),
                    });
                    Ok(version)
                }
                _ => Err(AppError::Conflict(format!("lock '{lock}'"))),
            }
        }
    }

    fn lock() -> LockName {
        LockName::new("default", "handle-test").unwrap_or_else(|_| unreachable!())
    }

    fn identity(value: &str) -> NonEmptyString {
        NonEmptyString::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    #[tokio::test]
    async fn read_reports_missing_record_as_not_found() {
        let mut handle = LockHandle::new(
            Arc::new(SingleRecordStore::default()),
            lock(),
            Duration::from_secs(1),
        );

        let result = handle.read().await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(handle.observed_version().is_none());
    }

    #[tokio::test]
    async fn create_records_observed_version() {
        let mut handle = LockHandle::new(
            Arc::new(SingleRecordStore::default()),
            lock(),
            Duration::from_secs(1),
        );

        let created = handle.create(&identity("a"), at(0), 60).await;
        assert!(created.is_ok());
        assert_eq!(
            handle.observed_version().map(VersionToken::as_str),
            Some("1")
        );
    }

    #[tokio::test]
    async fn second_create_observes_already_exists() {
        let store = Arc::new(SingleRecordStore::default());
        let mut first = LockHandle::new(store.clone(), lock(), Duration::from_secs(1));
        let mut second = LockHandle::new(store, lock(), Duration::from_secs(1));

        assert!(first.create(&identity("a"), at(0), 60).await.is_ok());
        let result = second.create(&identity("b"), at(0), 60).await;
        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let store = Arc::new(SingleRecordStore::default());
        let mut handle = LockHandle::new(store, lock(), Duration::from_secs(1));
        let created = handle
            .create(&identity("a"), at(0), 60)
            .await
            .unwrap_or_else(|_| unreachable!());

        let renewed = handle
            .try_update(&created.version, created.record.renewed(at(20), 60))
            .await;
        assert!(renewed.is_ok());

        let stale = handle
            .try_update(&created.version, created.record.renewed(at(40), 60))
            .await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_call_times_out_as_unavailable() {
        let store = Arc::new(SingleRecordStore {
            current: Mutex::new(None),
            stall: true,
        });
        let mut handle = LockHandle::new(store, lock(), Duration::from_secs(5));

        let result = handle.read().await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }
}
