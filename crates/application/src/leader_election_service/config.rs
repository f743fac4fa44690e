use std::time::Duration;

use tenure_core::{AppError, AppResult, NonEmptyString};
use tenure_domain::{ElectionTiming, LockName};

/// Default bound on a single lock store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration handed to one [`super::LeaderElector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    lock: LockName,
    identity: NonEmptyString,
    timing: ElectionTiming,
    store_timeout: Duration,
}

impl LeaderElectionConfig {
    /// Creates election configuration with the default store timeout.
    #[must_use]
    pub fn new(lock: LockName, identity: NonEmptyString, timing: ElectionTiming) -> Self {
        let store_timeout = DEFAULT_STORE_TIMEOUT.min(timing.retry_period());
        Self {
            lock,
            identity,
            timing,
            store_timeout,
        }
    }

    /// Overrides the bound applied to each lock store call.
    ///
    /// The timeout must be positive and no longer than the retry period, so a
    /// stalled call cannot hide a missed renew deadline.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> AppResult<Self> {
        if store_timeout.is_zero() {
            return Err(AppError::Validation(
                "store_timeout must be greater than zero".to_owned(),
            ));
        }

        if store_timeout > self.timing.retry_period() {
            return Err(AppError::Validation(format!(
                "store_timeout ({store_timeout:?}) must not exceed retry_period ({:?})",
                self.timing.retry_period()
            )));
        }

        self.store_timeout = store_timeout;
        Ok(self)
    }

    /// Returns the lock name.
    #[must_use]
    pub fn lock(&self) -> &LockName {
        &self.lock
    }

    /// Returns this replica's identity.
    #[must_use]
    pub fn identity(&self) -> &NonEmptyString {
        &self.identity
    }

    /// Returns the election timing.
    #[must_use]
    pub fn timing(&self) -> ElectionTiming {
        self.timing
    }

    /// Returns the bound applied to each lock store call.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}
