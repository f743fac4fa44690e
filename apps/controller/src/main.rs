//! Tenure controller runtime: runs a reconcile workload on whichever replica
//! holds the shared election lock.

#![forbid(unsafe_code)]

mod controller_config;
mod reconcile_engine;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tenure_application::{LeaderElector, LockRecordStore, WorkloadActivation};
use tenure_core::{AppError, AppResult};
use tenure_domain::ElectionOutcome;
use tenure_infrastructure::{
    InMemoryLockRecordStore, PostgresLockRecordStore, RedisLockRecordStore, SystemClock,
    TracingElectionEventRecorder,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::controller_config::{ControllerConfig, LockBackend, init_tracing};
use crate::reconcile_engine::ReconcileEngine;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ControllerConfig::load()?;
    let election_config = config.election_config()?;
    let store = build_store(&config).await?;
    check_store_reachable(store.as_ref(), &config).await?;

    info!(
        backend = config.backend.as_str(),
        lock = %config.lock,
        identity = %config.identity,
        workload_parallelism = config.workload_parallelism,
        "tenure-controller started"
    );

    let shutdown = CancellationToken::new();
    let workload_failed = CancellationToken::new();
    let engine = Arc::new(ReconcileEngine::new(
        config.identity.as_str(),
        config.workload_poll_interval,
    ));
    let activation = WorkloadActivation::new(engine, config.workload_parallelism)?
        .with_failure_signal(workload_failed.clone());

    let elector = LeaderElector::new(
        election_config,
        store,
        Arc::new(SystemClock),
        Arc::new(activation),
    )
    .with_event_recorder(Arc::new(TracingElectionEventRecorder::new()));

    tokio::spawn(watch_for_shutdown(shutdown.clone(), workload_failed.clone()));

    match elector.run(shutdown).await {
        ElectionOutcome::LeadershipLost => {
            error!(
                lock = %config.lock,
                identity = %config.identity,
                "leadership lost; exiting so the supervisor restarts this replica"
            );
            Err(AppError::Internal(format!(
                "leadership of lock '{}' lost",
                config.lock
            )))
        }
        ElectionOutcome::Shutdown { .. } if workload_failed.is_cancelled() => Err(
            AppError::Internal("workload failed while leading".to_owned()),
        ),
        ElectionOutcome::Shutdown { was_leader } => {
            info!(was_leader, "tenure-controller stopped");
            Ok(())
        }
    }
}

async fn build_store(config: &ControllerConfig) -> AppResult<Arc<dyn LockRecordStore>> {
    match &config.backend {
        LockBackend::Redis { url, key_prefix } => {
            let client = redis::Client::open(url.as_str())
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
            Ok(Arc::new(RedisLockRecordStore::new(
                client,
                key_prefix.as_str(),
            )))
        }
        LockBackend::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(config.store_timeout)
                .connect(database_url.as_str())
                .await
                .map_err(|error| {
                    AppError::Unavailable(format!("failed to connect to database: {error}"))
                })?;

            sqlx::migrate!("../../crates/infrastructure/migrations")
                .run(&pool)
                .await
                .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

            Ok(Arc::new(PostgresLockRecordStore::new(pool)))
        }
        LockBackend::Memory => {
            warn!("in-memory lock store only coordinates electors inside this process");
            Ok(Arc::new(InMemoryLockRecordStore::new()))
        }
    }
}

/// Fails startup when the lock store cannot be reached at all.
async fn check_store_reachable(store: &dyn LockRecordStore, config: &ControllerConfig) -> AppResult<()> {
    let lock = &config.lock;
    let answer = tokio::time::timeout(config.store_timeout, store.read(lock))
        .await
        .map_err(|_| {
            AppError::Unavailable(format!(
                "lock store did not answer within {:?}",
                config.store_timeout
            ))
        })?;

    match answer {
        Ok(snapshot) => {
            info!(
                lock = %lock,
                holder_identity = snapshot.record.holder_identity(),
                renew_time = %snapshot.record.renew_time(),
                "lock store reachable"
            );
            Ok(())
        }
        Err(AppError::NotFound(_)) => {
            info!(lock = %lock, "lock store reachable; lock not created yet");
            Ok(())
        }
        Err(error) => Err(error),
    }
}

async fn watch_for_shutdown(shutdown: CancellationToken, workload_failed: CancellationToken) {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(error) => {
                warn!(error = %error, "failed to listen for shutdown signal");
                workload_failed.cancelled().await;
                error!("workload failed; shutting down leader election");
            }
        },
        () = workload_failed.cancelled() => {
            error!("workload failed; shutting down leader election");
        }
    }

    shutdown.cancel();
}
