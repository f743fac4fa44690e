use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tenure_domain::{LockName, StopReason};
use tokio_util::sync::CancellationToken;

/// One leadership term handed to the started-leading callback.
#[derive(Debug, Clone)]
pub struct LeadershipTerm {
    lock: LockName,
    identity: String,
    acquired_at: DateTime<Utc>,
    stop: CancellationToken,
}

impl LeadershipTerm {
    /// Creates a term description.
    #[must_use]
    pub fn new(
        lock: LockName,
        identity: impl Into<String>,
        acquired_at: DateTime<Utc>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            lock,
            identity: identity.into(),
            acquired_at,
            stop,
        }
    }

    /// Returns the lock that was acquired.
    #[must_use]
    pub fn lock(&self) -> &LockName {
        &self.lock
    }

    /// Returns the identity holding the lock.
    #[must_use]
    pub fn identity(&self) -> &str {
        self.identity.as_str()
    }

    /// Returns when this replica became leader.
    #[must_use]
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Returns a token cancelled when the term ends.
    #[must_use]
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// Activation hooks invoked by the elector on role transitions.
///
/// Both hooks run on the elector task; neither may block for long.
#[async_trait]
pub trait LeadershipCallbacks: Send + Sync {
    /// Called once when this replica becomes leader.
    async fn on_started_leading(&self, term: LeadershipTerm);

    /// Called once when this replica stops leading.
    async fn on_stopped_leading(&self, reason: StopReason);
}
