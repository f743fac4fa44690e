use std::collections::HashMap;

use async_trait::async_trait;
use tenure_application::LockRecordStore;
use tenure_core::{AppError, AppResult};
use tenure_domain::{LockName, LockRecord, LockRecordSnapshot, VersionToken};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredLock {
    record: LockRecord,
    version: u64,
}

impl StoredLock {
    fn snapshot(&self) -> LockRecordSnapshot {
        LockRecordSnapshot {
            record: self.record.clone(),
            version: VersionToken::new(self.version.to_string()),
        }
    }
}

/// In-memory lock record store for single-process runs and tests.
#[derive(Default)]
pub struct InMemoryLockRecordStore {
    locks: RwLock<HashMap<LockName, StoredLock>>,
}

impl InMemoryLockRecordStore {
    /// Creates an empty in-memory lock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockRecordStore for InMemoryLockRecordStore {
    async fn read(&self, lock: &LockName) -> AppResult<LockRecordSnapshot> {
        self.locks
            .read()
            .await
            .get(lock)
            .map(StoredLock::snapshot)
            .ok_or_else(|| AppError::NotFound(format!("lock '{lock}' does not exist")))
    }

    async fn create(&self, lock: &LockName, record: &LockRecord) -> AppResult<VersionToken> {
        let mut locks = self.locks.write().await;
        if locks.contains_key(lock) {
            return Err(AppError::AlreadyExists(format!(
                "lock '{lock}' already exists"
            )));
        }

        let stored = StoredLock {
            record: record.clone(),
            version: 1,
        };
        let version = VersionToken::new(stored.version.to_string());
        locks.insert(lock.clone(), stored);

        Ok(version)
    }

    async fn conditional_write(
        &self,
        lock: &LockName,
        expected_version: &VersionToken,
        record: &LockRecord,
    ) -> AppResult<VersionToken> {
        let mut locks = self.locks.write().await;
        let Some(stored) = locks.get_mut(lock) else {
            return Err(AppError::NotFound(format!("lock '{lock}' does not exist")));
        };

        if stored.version.to_string() != expected_version.as_str() {
            return Err(AppError::Conflict(format!(
                "lock '{lock}' moved past version {expected_version}"
            )));
        }

        let next_version = stored.version.checked_add(1).ok_or_else(|| {
            AppError::Internal(format!("version counter of lock '{lock}' overflowed"))
        })?;
        stored.record = record.clone();
        stored.version = next_version;

        Ok(VersionToken::new(stored.version.to_string()))
    }
}
