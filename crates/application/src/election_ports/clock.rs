use chrono::{DateTime, Utc};

/// Wall-clock source used for lease bookkeeping.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}
