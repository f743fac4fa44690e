use async_trait::async_trait;
use tenure_core::AppResult;
use tenure_domain::{LockName, LockRecord, LockRecordSnapshot, VersionToken};

/// Shared, strongly consistent storage for named lock records.
///
/// Implementations must make `create` atomic and `conditional_write` a
/// compare-and-set on the version token. Connection failures and timeouts
/// are reported as `AppError::Unavailable`.
#[async_trait]
pub trait LockRecordStore: Send + Sync {
    /// Reads the record and its version, or `AppError::NotFound` when absent.
    async fn read(&self, lock: &LockName) -> AppResult<LockRecordSnapshot>;

    /// Creates the record, or fails with `AppError::AlreadyExists`.
    async fn create(&self, lock: &LockName, record: &LockRecord) -> AppResult<VersionToken>;

    /// Replaces the record when `expected_version` is still current, or fails
    /// with `AppError::Conflict`.
    async fn conditional_write(
        &self,
        lock: &LockName,
        expected_version: &VersionToken,
        record: &LockRecord,
    ) -> AppResult<VersionToken>;
}
