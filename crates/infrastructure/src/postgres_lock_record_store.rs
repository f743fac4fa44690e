//! PostgreSQL-backed lock record store using the `election_locks` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use tenure_application::LockRecordStore;
use tenure_core::{AppError, AppResult};
use tenure_domain::{LockName, LockRecord, LockRecordFields, LockRecordSnapshot, VersionToken};

/// PostgreSQL implementation of the lock record store port.
#[derive(Clone)]
pub struct PostgresLockRecordStore {
    pool: PgPool,
}

impl PostgresLockRecordStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, lock: &LockName) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM election_locks
                WHERE namespace = $1 AND name = $2
            )
            "#,
        )
        .bind(lock.namespace())
        .bind(lock.name())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| store_error(format!("failed to check lock '{lock}'"), error))
    }
}

#[async_trait]
impl LockRecordStore for PostgresLockRecordStore {
    async fn read(&self, lock: &LockName) -> AppResult<LockRecordSnapshot> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT holder_identity, acquire_time, renew_time,
                   lease_duration_seconds, leader_transitions, version
            FROM election_locks
            WHERE namespace = $1 AND name = $2
            "#,
        )
        .bind(lock.namespace())
        .bind(lock.name())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(format!("failed to read lock '{lock}'"), error))?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!("lock '{lock}' does not exist")));
        };

        row.into_snapshot(lock)
    }

    async fn create(&self, lock: &LockName, record: &LockRecord) -> AppResult<VersionToken> {
        let columns = RecordColumns::from_record(record)?;
        let version = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO election_locks (
                namespace, name, holder_identity, acquire_time, renew_time,
                lease_duration_seconds, leader_transitions, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
            ON CONFLICT (namespace, name) DO NOTHING
            RETURNING version
            "#,
        )
        .bind(lock.namespace())
        .bind(lock.name())
        .bind(record.holder_identity())
        .bind(record.acquire_time())
        .bind(record.renew_time())
        .bind(columns.lease_duration_seconds)
        .bind(columns.leader_transitions)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(format!("failed to create lock '{lock}'"), error))?;

        match version {
            Some(version) => Ok(VersionToken::new(version.to_string())),
            None => Err(AppError::AlreadyExists(format!(
                "lock '{lock}' already exists"
            ))),
        }
    }

    async fn conditional_write(
        &self,
        lock: &LockName,
        expected_version: &VersionToken,
        record: &LockRecord,
    ) -> AppResult<VersionToken> {
        let Ok(expected) = expected_version.as_str().parse::<i64>() else {
            return Err(AppError::Conflict(format!(
                "version {expected_version} was not issued for lock '{lock}'"
            )));
        };

        let columns = RecordColumns::from_record(record)?;
        let version = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE election_locks
            SET holder_identity = $4,
                acquire_time = $5,
                renew_time = $6,
                lease_duration_seconds = $7,
                leader_transitions = $8,
                version = version + 1
            WHERE namespace = $1 AND name = $2 AND version = $3
            RETURNING version
            "#,
        )
        .bind(lock.namespace())
        .bind(lock.name())
        .bind(expected)
        .bind(record.holder_identity())
        .bind(record.acquire_time())
        .bind(record.renew_time())
        .bind(columns.lease_duration_seconds)
        .bind(columns.leader_transitions)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| store_error(format!("failed to write lock '{lock}'"), error))?;

        if let Some(version) = version {
            return Ok(VersionToken::new(version.to_string()));
        }

        if self.exists(lock).await? {
            Err(AppError::Conflict(format!(
                "lock '{lock}' moved past version {expected_version}"
            )))
        } else {
            Err(AppError::NotFound(format!("lock '{lock}' does not exist")))
        }
    }
}

fn store_error(context: String, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AppError::Unavailable(format!("{context}: {error}")),
        _ => AppError::Internal(format!("{context}: {error}")),
    }
}

struct RecordColumns {
    lease_duration_seconds: i32,
    leader_transitions: i32,
}

impl RecordColumns {
    fn from_record(record: &LockRecord) -> AppResult<Self> {
        let lease_duration_seconds = i32::try_from(record.lease_duration_seconds()).map_err(|_| {
            AppError::Validation(format!(
                "lease_duration_seconds {} does not fit the lock table",
                record.lease_duration_seconds()
            ))
        })?;
        let leader_transitions = i32::try_from(record.leader_transitions()).map_err(|_| {
            AppError::Validation(format!(
                "leader_transitions {} does not fit the lock table",
                record.leader_transitions()
            ))
        })?;

        Ok(Self {
            lease_duration_seconds,
            leader_transitions,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    holder_identity: String,
    acquire_time: DateTime<Utc>,
    renew_time: DateTime<Utc>,
    lease_duration_seconds: i32,
    leader_transitions: i32,
    version: i64,
}

impl LockRow {
    fn into_snapshot(self, lock: &LockName) -> AppResult<LockRecordSnapshot> {
        let malformed = |column: &str| {
            AppError::Internal(format!("stored {column} for lock '{lock}' is negative"))
        };

        let record = LockRecord::from_fields(LockRecordFields {
            holder_identity: self.holder_identity,
            acquire_time: self.acquire_time,
            renew_time: self.renew_time,
            lease_duration_seconds: u32::try_from(self.lease_duration_seconds)
                .map_err(|_| malformed("lease_duration_seconds"))?,
            leader_transitions: u32::try_from(self.leader_transitions)
                .map_err(|_| malformed("leader_transitions"))?,
        })
        .map_err(|error| {
            AppError::Internal(format!("stored record for lock '{lock}' is invalid: {error}"))
        })?;

        Ok(LockRecordSnapshot {
            record,
            version: VersionToken::new(self.version.to_string()),
        })
    }
}

#[cfg(test)]
mod tests;
