//! Redis-backed lock record store with Lua compare-and-set.
//!
//! Each lock is one hash at `{prefix}:{namespace}/{name}` holding a numeric
//! `version` field and the JSON-encoded `record`.

use async_trait::async_trait;
use redis::Script;
use tenure_application::LockRecordStore;
use tenure_core::{AppError, AppResult};
use tenure_domain::{LockName, LockRecord, LockRecordSnapshot, VersionToken};

const CREATE_LOCK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'version', 1, 'record', ARGV[1])
return 1
"#;

const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'version')
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
local next_version = redis.call('HINCRBY', KEYS[1], 'version', 1)
redis.call('HSET', KEYS[1], 'record', ARGV[2])
return next_version
"#;

/// Redis implementation of the lock record store port.
#[derive(Clone)]
pub struct RedisLockRecordStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLockRecordStore {
    /// Creates one store adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, lock: &LockName) -> String {
        format!("{}:{lock}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

fn encode_record(record: &LockRecord) -> AppResult<String> {
    serde_json::to_string(record)
        .map_err(|error| AppError::Internal(format!("failed to encode lock record: {error}")))
}

fn decode_record(lock: &LockName, payload: &str) -> AppResult<LockRecord> {
    serde_json::from_str(payload).map_err(|error| {
        AppError::Internal(format!("stored record for lock '{lock}' is malformed: {error}"))
    })
}

#[async_trait]
impl LockRecordStore for RedisLockRecordStore {
    async fn read(&self, lock: &LockName) -> AppResult<LockRecordSnapshot> {
        let mut connection = self.connection().await?;

        let (version, payload): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(self.key_for(lock))
            .arg("version")
            .arg("record")
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to read lock '{lock}': {error}"))
            })?;

        match (version, payload) {
            (Some(version), Some(payload)) => Ok(LockRecordSnapshot {
                record: decode_record(lock, payload.as_str())?,
                version: VersionToken::new(version),
            }),
            (None, None) => Err(AppError::NotFound(format!("lock '{lock}' does not exist"))),
            _ => Err(AppError::Internal(format!(
                "stored hash for lock '{lock}' is missing its version or record"
            ))),
        }
    }

    async fn create(&self, lock: &LockName, record: &LockRecord) -> AppResult<VersionToken> {
        let payload = encode_record(record)?;
        let mut connection = self.connection().await?;

        let created = Script::new(CREATE_LOCK_SCRIPT)
            .key(self.key_for(lock))
            .arg(payload)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to create lock '{lock}': {error}"))
            })?;

        if created == 0 {
            return Err(AppError::AlreadyExists(format!(
                "lock '{lock}' already exists"
            )));
        }

        Ok(VersionToken::new("1"))
    }

    async fn conditional_write(
        &self,
        lock: &LockName,
        expected_version: &VersionToken,
        record: &LockRecord,
    ) -> AppResult<VersionToken> {
        let payload = encode_record(record)?;
        let mut connection = self.connection().await?;

        let outcome = Script::new(COMPARE_AND_SET_SCRIPT)
            .key(self.key_for(lock))
            .arg(expected_version.as_str())
            .arg(payload)
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to write lock '{lock}': {error}"))
            })?;

        match outcome {
            -1 => Err(AppError::NotFound(format!("lock '{lock}' does not exist"))),
            0 => Err(AppError::Conflict(format!(
                "lock '{lock}' moved past version {expected_version}"
            ))),
            next_version => Ok(VersionToken::new(next_version.to_string())),
        }
    }
}
