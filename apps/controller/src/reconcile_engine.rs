use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tenure_application::WorkloadEngine;
use tenure_core::{AppError, AppResult};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Polling workload run by the leader: each worker performs one reconcile
/// pass per poll interval until the leadership term ends.
pub struct ReconcileEngine {
    identity: String,
    poll_interval: Duration,
    passes: Arc<AtomicU64>,
}

impl ReconcileEngine {
    pub fn new(identity: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            identity: identity.into(),
            poll_interval,
            passes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn completed_passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkloadEngine for ReconcileEngine {
    async fn start(&self, parallelism: usize, stop: CancellationToken) -> AppResult<()> {
        info!(
            identity = %self.identity,
            parallelism,
            poll_interval_ms = self.poll_interval.as_millis(),
            "reconcile workers started"
        );

        let mut workers = JoinSet::new();
        for worker in 0..parallelism {
            let stop = stop.clone();
            let passes = Arc::clone(&self.passes);
            let poll_interval = self.poll_interval;
            workers.spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        () = stop.cancelled() => break,
                        () = tokio::time::sleep(poll_interval) => {
                            let pass = passes.fetch_add(1, Ordering::Relaxed) + 1;
                            debug!(worker, pass, "reconcile pass complete");
                        }
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|error| {
                AppError::Internal(format!("reconcile worker ended abnormally: {error}"))
            })?;
        }

        info!(
            identity = %self.identity,
            passes = self.completed_passes(),
            "reconcile workers stopped"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tenure_application::WorkloadEngine;
    use tokio_util::sync::CancellationToken;

    use super::ReconcileEngine;

    #[tokio::test(start_paused = true)]
    async fn every_worker_polls_until_stopped() {
        let engine = std::sync::Arc::new(ReconcileEngine::new("replica-a", Duration::from_secs(5)));
        let stop = CancellationToken::new();

        let running = tokio::spawn({
            let engine = std::sync::Arc::clone(&engine);
            let stop = stop.clone();
            async move { engine.start(3, stop).await }
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        stop.cancel();

        let result = running.await.unwrap_or_else(|_| unreachable!());
        assert!(result.is_ok());
        assert_eq!(engine.completed_passes(), 6);
    }

    #[tokio::test]
    async fn cancelled_stop_signal_returns_immediately() {
        let engine = ReconcileEngine::new("replica-a", Duration::from_secs(60));
        let stop = CancellationToken::new();
        stop.cancel();

        assert!(engine.start(2, stop).await.is_ok());
        assert_eq!(engine.completed_passes(), 0);
    }
}
