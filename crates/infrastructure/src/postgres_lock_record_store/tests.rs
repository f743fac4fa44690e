use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tenure_application::LockRecordStore;
use tenure_core::{AppError, NonEmptyString};
use tenure_domain::{LockName, LockRecord, VersionToken};

use super::PostgresLockRecordStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres lock store tests: {error}");
    }

    Some(pool)
}

fn unique_lock(prefix: &str) -> LockName {
    LockName::new(
        "postgres-tests",
        format!("{prefix}-{}", Utc::now().timestamp_micros()),
    )
    .unwrap_or_else(|_| unreachable!())
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
async fn create_conflicts_and_renewal_follow_versions() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresLockRecordStore::new(pool);
    let lock = unique_lock("cas");
    let record = LockRecord::first_claim(&identity("a"), at(0), 60);

    assert!(matches!(store.read(&lock).await, Err(AppError::NotFound(_))));

    let created = store
        .create(&lock, &record)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(
        store.create(&lock, &record).await,
        Err(AppError::AlreadyExists(_))
    ));

    let renewed = store
        .conditional_write(&lock, &created, &record.renewed(at(20), 60))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_ne!(renewed, created);

    let stale = store
        .conditional_write(
            &lock,
            &created,
            &record.claimed_by(&identity("b"), at(90), 60),
        )
        .await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));

    let current = store.read(&lock).await.unwrap_or_else(|_| unreachable!());
    assert_eq!(current.version, renewed);
    assert!(current.record.is_held_by("a"));
    assert_eq!(current.record.renew_time(), at(20));
}

#[tokio::test]
async fn takeover_persists_transitions_and_acquire_time() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresLockRecordStore::new(pool);
    let lock = unique_lock("takeover");
    let record = LockRecord::first_claim(&identity("a"), at(0), 60);
    let created = store
        .create(&lock, &record)
        .await
        .unwrap_or_else(|_| unreachable!());

    let claim = record.claimed_by(&identity("b"), at(100), 60);
    assert!(
        store
            .conditional_write(&lock, &created, &claim)
            .await
            .is_ok()
    );

    let current = store.read(&lock).await.unwrap_or_else(|_| unreachable!());
    assert_eq!(current.record, claim);
    assert_eq!(current.record.leader_transitions(), 1);
    assert_eq!(current.record.acquire_time(), at(100));
}

#[tokio::test]
async fn write_to_missing_lock_is_not_found_and_foreign_token_conflicts() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let store = PostgresLockRecordStore::new(pool);
    let lock = unique_lock("missing");
    let record = LockRecord::first_claim(&identity("a"), at(0), 60);

    let missing = store
        .conditional_write(&lock, &VersionToken::new("1"), &record)
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    assert!(store.create(&lock, &record).await.is_ok());
    let foreign = store
        .conditional_write(&lock, &VersionToken::new("not-a-version"), &record)
        .await;
    assert!(matches!(foreign, Err(AppError::Conflict(_))));
}
