//! Lease-based leader election over a shared lock record.
//!
//! One [`LeaderElector`] runs per replica. Its loop is the only writer of the
//! replica's election state and the only caller of its [`LockHandle`]:
//!
//! - as follower it creates the record when absent, or claims it once the
//!   holder's lease has expired;
//! - as leader it renews the record every retry period, and steps down for
//!   good once no renewal has succeeded within the renew deadline.
//!
//! Stepping down is terminal. The run returns
//! [`ElectionOutcome::LeadershipLost`] and the process is expected to restart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tenure_domain::{
    ElectionEvent, ElectionEventKind, ElectionOutcome, ElectionRole, LockRecordSnapshot,
    StopReason,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::election_ports::{Clock, ElectionEventRecorder, LeadershipCallbacks, LockRecordStore};
use crate::lock_handle::LockHandle;

mod acquire;
mod config;
mod renew;
mod status;

pub use config::{DEFAULT_STORE_TIMEOUT, LeaderElectionConfig};
pub use status::ElectionStatus;
use status::ElectionStatusSnapshot;

/// Per-replica election state, owned by the elector loop.
#[derive(Debug)]
struct ElectionState {
    role: ElectionRole,
    held: Option<LockRecordSnapshot>,
    last_renew_attempt: Option<DateTime<Utc>>,
    last_successful_renew: Option<DateTime<Utc>>,
    term_stop: Option<CancellationToken>,
}

impl ElectionState {
    fn new() -> Self {
        Self {
            role: ElectionRole::Follower,
            held: None,
            last_renew_attempt: None,
            last_successful_renew: None,
            term_stop: None,
        }
    }
}

/// Election state machine for one replica.
pub struct LeaderElector {
    config: LeaderElectionConfig,
    handle: LockHandle,
    clock: Arc<dyn Clock>,
    callbacks: Arc<dyn LeadershipCallbacks>,
    event_recorder: Option<Arc<dyn ElectionEventRecorder>>,
    status: watch::Sender<ElectionStatusSnapshot>,
    state: ElectionState,
}

impl LeaderElector {
    /// Creates an elector in the follower role.
    #[must_use]
    pub fn new(
        config: LeaderElectionConfig,
        store: Arc<dyn LockRecordStore>,
        clock: Arc<dyn Clock>,
        callbacks: Arc<dyn LeadershipCallbacks>,
    ) -> Self {
        let handle = LockHandle::new(store, config.lock().clone(), config.store_timeout());
        let (status, _) = watch::channel(ElectionStatusSnapshot::initial());

        Self {
            config,
            handle,
            clock,
            callbacks,
            event_recorder: None,
            status,
            state: ElectionState::new(),
        }
    }

    /// Adds an optional sink for leadership events.
    #[must_use]
    pub fn with_event_recorder(mut self, event_recorder: Arc<dyn ElectionEventRecorder>) -> Self {
        self.event_recorder = Some(event_recorder);
        self
    }

    /// Returns an observer for this elector's role.
    #[must_use]
    pub fn status(&self) -> ElectionStatus {
        ElectionStatus::new(self.status.subscribe())
    }

    /// Runs the election loop until leadership is lost or `shutdown` fires.
    ///
    /// The first attempt is made immediately, then once per retry period.
    /// Shutdown never releases the lock; a leader's lease simply expires.
    pub async fn run(mut self, shutdown: CancellationToken) -> ElectionOutcome {
        let timing = self.config.timing();
        info!(
            lock = %self.config.lock(),
            identity = %self.config.identity(),
            lease_duration_ms = timing.lease_duration().as_millis(),
            renew_deadline_ms = timing.renew_deadline().as_millis(),
            retry_period_ms = timing.retry_period().as_millis(),
            "starting leader election"
        );

        loop {
            if shutdown.is_cancelled() {
                return self.shut_down().await;
            }

            self.tick().await;

            if self.state.role == ElectionRole::Stopped {
                return ElectionOutcome::LeadershipLost;
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return self.shut_down().await,
                () = tokio::time::sleep(timing.retry_period()) => {}
            }
        }
    }

    async fn tick(&mut self) {
        let now = self.clock.now();
        match self.state.role {
            ElectionRole::Follower => self.try_acquire(now).await,
            ElectionRole::Leader => self.try_renew(now).await,
            ElectionRole::Stopped => {}
        }
    }

    async fn shut_down(mut self) -> ElectionOutcome {
        let was_leader = self.state.role == ElectionRole::Leader;
        if was_leader {
            let now = self.clock.now();
            self.step_down(StopReason::Shutdown, now).await;
        } else {
            self.state.role = ElectionRole::Stopped;
            self.publish_role(ElectionRole::Stopped);
        }

        info!(
            lock = %self.config.lock(),
            identity = %self.config.identity(),
            was_leader,
            "leader election shut down; lock left to expire"
        );

        ElectionOutcome::Shutdown { was_leader }
    }

    async fn step_down(&mut self, reason: StopReason, now: DateTime<Utc>) {
        self.state.role = ElectionRole::Stopped;
        self.state.held = None;
        if let Some(term_stop) = self.state.term_stop.take() {
            term_stop.cancel();
        }
        self.publish_role(ElectionRole::Stopped);

        match reason {
            StopReason::RenewDeadlineExceeded => error!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                last_successful_renew = ?self.state.last_successful_renew,
                last_renew_attempt = ?self.state.last_renew_attempt,
                last_observed_version = ?self.handle.observed_version(),
                "leadership lost: renew deadline exceeded"
            ),
            StopReason::Shutdown => info!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                "leadership relinquished for shutdown"
            ),
        }

        self.record_event(ElectionEventKind::StoppedLeading { reason }, now)
            .await;
        self.callbacks.on_stopped_leading(reason).await;
    }

    fn publish_role(&self, role: ElectionRole) {
        self.status.send_modify(|snapshot| snapshot.role = role);
    }

    fn publish_observed_leader(&self, holder_identity: &str) -> bool {
        self.status.send_if_modified(|snapshot| {
            if snapshot.observed_leader.as_deref() == Some(holder_identity) {
                return false;
            }
            snapshot.observed_leader = Some(holder_identity.to_owned());
            true
        })
    }

    async fn record_event(&self, kind: ElectionEventKind, observed_at: DateTime<Utc>) {
        let Some(event_recorder) = &self.event_recorder else {
            return;
        };

        let event = ElectionEvent {
            lock: self.config.lock().clone(),
            identity: self.config.identity().as_str().to_owned(),
            kind,
            observed_at,
        };

        if let Err(error) = event_recorder.record_event(event).await {
            warn!(
                lock = %self.config.lock(),
                error = %error,
                "failed to record election event"
            );
        }
    }
}
