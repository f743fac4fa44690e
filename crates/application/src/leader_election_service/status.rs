use tenure_core::{AppError, AppResult};
use tenure_domain::ElectionRole;
use tokio::sync::watch;

/// Point-in-time view of one elector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ElectionStatusSnapshot {
    pub(super) role: ElectionRole,
    /// Holder identity from the most recently observed lock record.
    pub(super) observed_leader: Option<String>,
}

impl ElectionStatusSnapshot {
    pub(super) fn initial() -> Self {
        Self {
            role: ElectionRole::Follower,
            observed_leader: None,
        }
    }
}

/// Read-only observer of an elector's role and the leader it last saw.
#[derive(Debug, Clone)]
pub struct ElectionStatus {
    receiver: watch::Receiver<ElectionStatusSnapshot>,
}

impl ElectionStatus {
    pub(super) fn new(receiver: watch::Receiver<ElectionStatusSnapshot>) -> Self {
        Self { receiver }
    }

    /// Returns the current role.
    #[must_use]
    pub fn role(&self) -> ElectionRole {
        self.receiver.borrow().role
    }

    /// Returns true while the elector holds leadership.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.role() == ElectionRole::Leader
    }

    /// Returns the holder identity most recently observed on the lock.
    #[must_use]
    pub fn observed_leader(&self) -> Option<String> {
        self.receiver.borrow().observed_leader.clone()
    }

    /// Waits until the elector reaches `role`.
    pub async fn wait_for_role(&mut self, role: ElectionRole) -> AppResult<()> {
        self.receiver
            .wait_for(|snapshot| snapshot.role == role)
            .await
            .map(|_| ())
            .map_err(|_| {
                AppError::Internal(format!(
                    "elector went away before reaching role '{}'",
                    role.as_str()
                ))
            })
    }
}
