use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tenure_core::{AppError, AppResult};

use crate::LockName;

/// Default time a holder may go without renewing before others may claim.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(60);
/// Default time a leader keeps retrying failed renewals before stepping down.
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(30);
/// Default wait between acquire or renew attempts.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(20);

/// Validated election timing.
///
/// Holds `retry_period < renew_deadline < lease_duration`. Correctness also
/// relies on `lease_duration - renew_deadline` covering realistic clock skew
/// and store latency between replicas; that margin is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionTiming {
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
}

impl ElectionTiming {
    /// Creates validated election timing.
    pub fn new(
        lease_duration: Duration,
        renew_deadline: Duration,
        retry_period: Duration,
    ) -> AppResult<Self> {
        if retry_period.is_zero() {
            return Err(AppError::Validation(
                "retry_period must be greater than zero".to_owned(),
            ));
        }

        if retry_period >= renew_deadline {
            return Err(AppError::Validation(format!(
                "retry_period ({retry_period:?}) must be less than renew_deadline ({renew_deadline:?})"
            )));
        }

        if renew_deadline >= lease_duration {
            return Err(AppError::Validation(format!(
                "renew_deadline ({renew_deadline:?}) must be less than lease_duration ({lease_duration:?})"
            )));
        }

        if lease_duration.subsec_nanos() != 0 {
            return Err(AppError::Validation(format!(
                "lease_duration ({lease_duration:?}) must be a whole number of seconds"
            )));
        }

        if u32::try_from(lease_duration.as_secs()).is_err() {
            return Err(AppError::Validation(format!(
                "lease_duration ({lease_duration:?}) is too large"
            )));
        }

        Ok(Self {
            lease_duration,
            renew_deadline,
            retry_period,
        })
    }

    /// Returns the lease duration.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Returns the lease duration as written into the lock record.
    #[must_use]
    pub fn lease_duration_seconds(&self) -> u32 {
        u32::try_from(self.lease_duration.as_secs()).unwrap_or(u32::MAX)
    }

    /// Returns the renew deadline.
    #[must_use]
    pub fn renew_deadline(&self) -> Duration {
        self.renew_deadline
    }

    /// Returns the retry period.
    #[must_use]
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    /// Returns true once `last_success` is further behind `now` than the renew deadline.
    #[must_use]
    pub fn renew_deadline_exceeded(
        &self,
        last_success: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let deadline = TimeDelta::from_std(self.renew_deadline).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(last_success) > deadline
    }
}

impl Default for ElectionTiming {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }
}

/// Role of one replica in the election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionRole {
    /// Waiting for the lock to become available.
    Follower,
    /// Holding the lock and renewing it.
    Leader,
    /// Terminal; the replica no longer takes part.
    Stopped,
}

impl ElectionRole {
    /// Returns stable log value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Leader => "leader",
            Self::Stopped => "stopped",
        }
    }
}

impl Display for ElectionRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Why a leadership term ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No renewal succeeded within the renew deadline.
    RenewDeadlineExceeded,
    /// The process asked the elector to shut down.
    Shutdown,
}

impl StopReason {
    /// Returns stable log value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenewDeadlineExceeded => "renew_deadline_exceeded",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Final result of one election run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Leadership was held and then lost; the process must restart.
    LeadershipLost,
    /// The run was cancelled through its shutdown signal.
    Shutdown {
        /// Whether the replica held leadership when it stopped.
        was_leader: bool,
    },
}

impl ElectionOutcome {
    /// Returns true when the surrounding supervisor must restart the process.
    #[must_use]
    pub fn must_restart(&self) -> bool {
        matches!(self, Self::LeadershipLost)
    }
}

/// Kind of leadership event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionEventKind {
    /// This replica became leader.
    StartedLeading,
    /// This replica stopped leading.
    StoppedLeading {
        /// Why the term ended.
        reason: StopReason,
    },
    /// A different holder was observed on the lock.
    NewLeaderObserved {
        /// Identity found in the lock record.
        holder_identity: String,
    },
}

/// Leadership event published to the event recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionEvent {
    /// Lock the event relates to.
    pub lock: LockName,
    /// Identity of the replica reporting the event.
    pub identity: String,
    /// Event kind.
    pub kind: ElectionEventKind,
    /// When the replica observed the event.
    pub observed_at: DateTime<Utc>,
}

impl ElectionEvent {
    /// Returns a short human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.kind {
            ElectionEventKind::StartedLeading => {
                format!("{} became leader of {}", self.identity, self.lock)
            }
            ElectionEventKind::StoppedLeading { reason } => format!(
                "{} stopped leading {} ({})",
                self.identity,
                self.lock,
                reason.as_str()
            ),
            ElectionEventKind::NewLeaderObserved { holder_identity } => format!(
                "{} observed {} as leader of {}",
                self.identity, holder_identity, self.lock
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone, Utc};

    use super::{ElectionOutcome, ElectionTiming};

    fn seconds(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn default_timing_matches_documented_values() {
        let timing = ElectionTiming::default();

        assert_eq!(timing.lease_duration(), seconds(60));
        assert_eq!(timing.renew_deadline(), seconds(30));
        assert_eq!(timing.retry_period(), seconds(20));
        assert_eq!(timing.lease_duration_seconds(), 60);
    }

    #[test]
    fn timing_requires_strict_ordering() {
        assert!(ElectionTiming::new(seconds(60), seconds(30), seconds(20)).is_ok());
        assert!(ElectionTiming::new(seconds(60), seconds(30), seconds(30)).is_err());
        assert!(ElectionTiming::new(seconds(30), seconds(30), seconds(20)).is_err());
        assert!(ElectionTiming::new(seconds(60), seconds(90), seconds(20)).is_err());
        assert!(ElectionTiming::new(seconds(60), seconds(30), Duration::ZERO).is_err());
    }

    #[test]
    fn timing_requires_whole_second_lease() {
        let result = ElectionTiming::new(
            Duration::from_millis(1500),
            Duration::from_millis(1000),
            Duration::from_millis(500),
        );

        assert!(result.is_err());
    }

    #[test]
    fn renew_deadline_is_exceeded_strictly_after_deadline() {
        let timing = ElectionTiming::default();
        let start = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_else(|| unreachable!());

        assert!(!timing.renew_deadline_exceeded(start, start + TimeDelta::seconds(30)));
        assert!(timing.renew_deadline_exceeded(start, start + TimeDelta::seconds(31)));
    }

    #[test]
    fn only_lost_leadership_requires_restart() {
        assert!(ElectionOutcome::LeadershipLost.must_restart());
        assert!(!ElectionOutcome::Shutdown { was_leader: true }.must_restart());
        assert!(!ElectionOutcome::Shutdown { was_leader: false }.must_restart());
    }
}
