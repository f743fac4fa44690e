//! Starts and stops a [`WorkloadEngine`] at leadership boundaries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tenure_core::{AppError, AppResult};
use tenure_domain::StopReason;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::election_ports::{LeadershipCallbacks, LeadershipTerm, WorkloadEngine};

/// Default wait for the workload to wind down after its stop signal.
pub const DEFAULT_WORKLOAD_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

struct RunningWorkload {
    stop: CancellationToken,
    task: JoinHandle<AppResult<()>>,
}

/// Leadership callbacks that run a workload engine only while leading.
pub struct WorkloadActivation {
    engine: Arc<dyn WorkloadEngine>,
    parallelism: usize,
    shutdown_grace: Duration,
    failure_signal: Option<CancellationToken>,
    running: Mutex<Option<RunningWorkload>>,
}

impl WorkloadActivation {
    /// Creates activation glue for `engine` with `parallelism` workers.
    pub fn new(engine: Arc<dyn WorkloadEngine>, parallelism: usize) -> AppResult<Self> {
        if parallelism == 0 {
            return Err(AppError::Validation(
                "workload parallelism must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            engine,
            parallelism,
            shutdown_grace: DEFAULT_WORKLOAD_SHUTDOWN_GRACE,
            failure_signal: None,
            running: Mutex::new(None),
        })
    }

    /// Overrides how long a stopped workload may take to exit.
    #[must_use]
    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    /// Cancels `failure_signal` if the engine fails while still leading.
    #[must_use]
    pub fn with_failure_signal(mut self, failure_signal: CancellationToken) -> Self {
        self.failure_signal = Some(failure_signal);
        self
    }

    /// Returns true while a workload task is attached to the current term.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }
}

#[async_trait]
impl LeadershipCallbacks for WorkloadActivation {
    async fn on_started_leading(&self, term: LeadershipTerm) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!(
                lock = %term.lock(),
                identity = %term.identity(),
                "workload already attached to a leadership term; ignoring start"
            );
            return;
        }

        info!(
            lock = %term.lock(),
            identity = %term.identity(),
            acquired_at = %term.acquired_at(),
            parallelism = self.parallelism,
            "starting workload"
        );

        let stop = term.stop_signal();
        let engine = Arc::clone(&self.engine);
        let parallelism = self.parallelism;
        let failure_signal = self.failure_signal.clone();
        let engine_stop = stop.clone();
        let task = tokio::spawn(async move {
            let result = engine.start(parallelism, engine_stop.clone()).await;
            if let Err(error) = &result
                && !engine_stop.is_cancelled()
            {
                error!(error = %error, "workload failed while leading");
                if let Some(failure_signal) = failure_signal {
                    failure_signal.cancel();
                }
            }
            result
        });

        *running = Some(RunningWorkload { stop, task });
    }

    async fn on_stopped_leading(&self, reason: StopReason) {
        match reason {
            StopReason::RenewDeadlineExceeded => {
                error!(reason = reason.as_str(), "lost leadership; stopping workload");
            }
            StopReason::Shutdown => {
                info!(reason = reason.as_str(), "stopping workload");
            }
        }

        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };

        running.stop.cancel();
        match tokio::time::timeout(self.shutdown_grace, &mut running.task).await {
            Ok(Ok(Ok(()))) => info!("workload stopped"),
            Ok(Ok(Err(error))) => warn!(error = %error, "workload stopped with error"),
            Ok(Err(join_error)) => warn!(error = %join_error, "workload task ended abnormally"),
            Err(_) => {
                error!(
                    grace_ms = self.shutdown_grace.as_millis(),
                    "workload ignored its stop signal; aborting"
                );
                running.task.abort();
                if let Err(join_error) = running.task.await
                    && !join_error.is_cancelled()
                {
                    warn!(error = %join_error, "aborted workload task ended abnormally");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tenure_core::{AppError, AppResult};
    use tenure_domain::{LockName, StopReason};
    use tokio_util::sync::CancellationToken;

    use super::WorkloadActivation;
    use crate::election_ports::{LeadershipCallbacks, LeadershipTerm, WorkloadEngine};

    #[derive(Default)]
    struct CountingEngine {
        starts: AtomicUsize,
        stops: AtomicUsize,
        last_parallelism: AtomicUsize,
    }

    #[async_trait]
    impl WorkloadEngine for CountingEngine {
        async fn start(&self, parallelism: usize, stop: CancellationToken) -> AppResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.last_parallelism.store(parallelism, Ordering::SeqCst);
            stop.cancelled().await;
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl WorkloadEngine for FailingEngine {
        async fn start(&self, _parallelism: usize, _stop: CancellationToken) -> AppResult<()> {
            Err(AppError::Internal("informer cache never synced".to_owned()))
        }
    }

    #[derive(Default)]
    struct StubbornEngine {
        work_done: AtomicUsize,
    }

    #[async_trait]
    impl WorkloadEngine for StubbornEngine {
        async fn start(&self, _parallelism: usize, _stop: CancellationToken) -> AppResult<()> {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                self.work_done.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn term(stop: CancellationToken) -> LeadershipTerm {
        LeadershipTerm::new(
            LockName::new("default", "controller-lock").unwrap_or_else(|_| unreachable!()),
            "replica-a",
            Utc.timestamp_opt(1_700_000_000, 0)
                .single()
                .unwrap_or_else(|| unreachable!()),
            stop,
        )
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let result = WorkloadActivation::new(Arc::new(CountingEngine::default()), 0);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn starts_engine_once_and_stops_it_with_term() {
        let engine = Arc::new(CountingEngine::default());
        let activation = WorkloadActivation::new(engine.clone(), 2)
            .unwrap_or_else(|_| unreachable!());
        let stop = CancellationToken::new();

        activation.on_started_leading(term(stop.clone())).await;
        activation.on_started_leading(term(stop.clone())).await;
        tokio::task::yield_now().await;

        assert!(activation.is_running().await);
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.last_parallelism.load(Ordering::SeqCst), 2);

        activation
            .on_stopped_leading(StopReason::RenewDeadlineExceeded)
            .await;

        assert!(stop.is_cancelled());
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert!(!activation.is_running().await);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let engine = Arc::new(CountingEngine::default());
        let activation = WorkloadActivation::new(engine.clone(), 1)
            .unwrap_or_else(|_| unreachable!());

        activation.on_stopped_leading(StopReason::Shutdown).await;

        assert_eq!(engine.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_failure_while_leading_fires_failure_signal() {
        let failure_signal = CancellationToken::new();
        let activation = WorkloadActivation::new(Arc::new(FailingEngine), 1)
            .unwrap_or_else(|_| unreachable!())
            .with_failure_signal(failure_signal.clone());

        activation
            .on_started_leading(term(CancellationToken::new()))
            .await;

        tokio::time::timeout(Duration::from_secs(1), failure_signal.cancelled())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(failure_signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn engine_ignoring_stop_signal_is_aborted_after_grace_period() {
        let engine = Arc::new(StubbornEngine::default());
        let activation = WorkloadActivation::new(engine.clone(), 1)
            .unwrap_or_else(|_| unreachable!())
            .with_shutdown_grace(Duration::from_secs(3));
        let stop = CancellationToken::new();

        activation.on_started_leading(term(stop.clone())).await;
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(engine.work_done.load(Ordering::SeqCst), 5);

        activation.on_stopped_leading(StopReason::Shutdown).await;
        let work_at_stop = engine.work_done.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(stop.is_cancelled());
        assert!(!activation.is_running().await);
        assert_eq!(engine.work_done.load(Ordering::SeqCst), work_at_stop);
    }
}
