use chrono::{DateTime, Utc};
use tenure_core::{AppError, AppResult};
use tenure_domain::{ElectionEventKind, ElectionRole, LockRecordSnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::election_ports::LeadershipTerm;

use super::LeaderElector;

/// Result of one follower attempt.
#[derive(Debug)]
enum AcquireAttempt {
    Acquired(LockRecordSnapshot),
    HeldByOther(LockRecordSnapshot),
    LostRace,
}

impl LeaderElector {
    /// Follower tick: create or claim the lock, or keep waiting.
    ///
    /// Store failures are swallowed here; the next tick simply tries again.
    pub(super) async fn try_acquire(&mut self, now: DateTime<Utc>) {
        match self.acquire_attempt(now).await {
            Ok(AcquireAttempt::Acquired(snapshot)) => self.become_leader(snapshot, now).await,
            Ok(AcquireAttempt::HeldByOther(snapshot)) => {
                let holder = snapshot.record.holder_identity();
                if self.publish_observed_leader(holder) {
                    info!(
                        lock = %self.config.lock(),
                        identity = %self.config.identity(),
                        leader = %holder,
                        "observed new leader"
                    );
                    self.record_event(
                        ElectionEventKind::NewLeaderObserved {
                            holder_identity: holder.to_owned(),
                        },
                        now,
                    )
                    .await;
                }
                debug!(
                    lock = %self.config.lock(),
                    leader = %holder,
                    expires_at = %snapshot.record.expires_at(),
                    "lock held by another replica"
                );
            }
            Ok(AcquireAttempt::LostRace) => debug!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                "lost lock acquisition race"
            ),
            Err(error) if error.is_unavailable() => warn!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                error = %error,
                "lock store unavailable; will retry"
            ),
            Err(error) => debug!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                error = %error,
                "failed to acquire lock"
            ),
        }
    }

    async fn acquire_attempt(&mut self, now: DateTime<Utc>) -> AppResult<AcquireAttempt> {
        let identity = self.config.identity().clone();
        let lease_duration_seconds = self.config.timing().lease_duration_seconds();

        let current = match self.handle.read().await {
            Ok(snapshot) => snapshot,
            Err(AppError::NotFound(_)) => {
                return match self
                    .handle
                    .create(&identity, now, lease_duration_seconds)
                    .await
                {
                    Ok(snapshot) => Ok(AcquireAttempt::Acquired(snapshot)),
                    Err(AppError::AlreadyExists(_)) => Ok(AcquireAttempt::LostRace),
                    Err(error) => Err(error),
                };
            }
            Err(error) => return Err(error),
        };

        if !current.record.is_held_by(identity.as_str()) && !current.record.is_expired_at(now) {
            return Ok(AcquireAttempt::HeldByOther(current));
        }

        let claim = current
            .record
            .claimed_by(&identity, now, lease_duration_seconds);
        match self.handle.try_update(&current.version, claim).await {
            Ok(snapshot) => Ok(AcquireAttempt::Acquired(snapshot)),
            Err(AppError::Conflict(_)) => Ok(AcquireAttempt::LostRace),
            Err(error) => Err(error),
        }
    }

    async fn become_leader(&mut self, snapshot: LockRecordSnapshot, now: DateTime<Utc>) {
        let term_stop = CancellationToken::new();
        let acquired_at = snapshot.record.acquire_time();
        let leader_transitions = snapshot.record.leader_transitions();

        self.state.role = ElectionRole::Leader;
        self.state.held = Some(snapshot);
        self.state.last_renew_attempt = Some(now);
        self.state.last_successful_renew = Some(now);
        self.state.term_stop = Some(term_stop.clone());

        self.publish_observed_leader(self.config.identity().as_str());
        self.publish_role(ElectionRole::Leader);

        info!(
            lock = %self.config.lock(),
            identity = %self.config.identity(),
            acquired_at = %acquired_at,
            leader_transitions,
            "acquired leadership"
        );

        self.record_event(ElectionEventKind::StartedLeading, now)
            .await;

        let term = LeadershipTerm::new(
            self.config.lock().clone(),
            self.config.identity().as_str(),
            acquired_at,
            term_stop,
        );
        self.callbacks.on_started_leading(term).await;
    }
}
