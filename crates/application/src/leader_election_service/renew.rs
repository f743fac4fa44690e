use chrono::{DateTime, Utc};
use tenure_core::{AppError, AppResult};
use tenure_domain::StopReason;
use tracing::{debug, warn};

use super::LeaderElector;

impl LeaderElector {
    /// Leader tick: renew the lease, stepping down once the deadline passes.
    pub(super) async fn try_renew(&mut self, now: DateTime<Utc>) {
        let last_success = self.state.last_successful_renew.unwrap_or(now);
        if self
            .config
            .timing()
            .renew_deadline_exceeded(last_success, now)
        {
            warn!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                last_successful_renew = %last_success,
                "renew deadline passed before this attempt; not renewing"
            );
            self.step_down(StopReason::RenewDeadlineExceeded, now)
                .await;
            return;
        }

        self.state.last_renew_attempt = Some(now);

        match self.renew_attempt(now).await {
            Ok(()) => {
                self.state.last_successful_renew = Some(now);
                debug!(
                    lock = %self.config.lock(),
                    identity = %self.config.identity(),
                    "renewed leadership"
                );
            }
            Err(error) => {
                let failed_at = self.clock.now();
                if self
                    .config
                    .timing()
                    .renew_deadline_exceeded(last_success, failed_at)
                {
                    warn!(
                        lock = %self.config.lock(),
                        identity = %self.config.identity(),
                        error = %error,
                        "final renewal attempt failed"
                    );
                    self.step_down(StopReason::RenewDeadlineExceeded, failed_at)
                        .await;
                    return;
                }

                warn!(
                    lock = %self.config.lock(),
                    identity = %self.config.identity(),
                    error = %error,
                    last_successful_renew = %last_success,
                    "failed to renew leadership; retrying"
                );
            }
        }
    }

    async fn renew_attempt(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        let Some(held) = self.state.held.clone() else {
            return Err(AppError::Internal(
                "leader has no held lock record to renew".to_owned(),
            ));
        };

        let renewal = held
            .record
            .renewed(now, self.config.timing().lease_duration_seconds());

        match self.handle.try_update(&held.version, renewal).await {
            Ok(snapshot) => {
                self.state.held = Some(snapshot);
                Ok(())
            }
            Err(AppError::Conflict(message)) => {
                self.refresh_held_after_conflict().await;
                Err(AppError::Conflict(message))
            }
            Err(error) => Err(error),
        }
    }

    /// Re-reads the record after a lost compare-and-set.
    ///
    /// A previous write may have landed even though its reply was lost. When
    /// the record still names this replica its version is adopted for the
    /// next attempt; a record held by anyone else is never adopted.
    async fn refresh_held_after_conflict(&mut self) {
        match self.handle.read().await {
            Ok(snapshot) if snapshot.record.is_held_by(self.config.identity().as_str()) => {
                debug!(
                    lock = %self.config.lock(),
                    version = %snapshot.version,
                    "adopting refreshed lock version"
                );
                self.state.held = Some(snapshot);
            }
            Ok(snapshot) => warn!(
                lock = %self.config.lock(),
                identity = %self.config.identity(),
                holder = %snapshot.record.holder_identity(),
                "lock record now names another holder"
            ),
            Err(error) => debug!(
                lock = %self.config.lock(),
                error = %error,
                "failed to refresh lock record after conflict"
            ),
        }
    }
}
