//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod election;
mod lock;

pub use election::{
    DEFAULT_LEASE_DURATION, DEFAULT_RENEW_DEADLINE, DEFAULT_RETRY_PERIOD, ElectionEvent,
    ElectionEventKind, ElectionOutcome, ElectionRole, ElectionTiming, StopReason,
};
pub use lock::{LockName, LockRecord, LockRecordFields, LockRecordSnapshot, VersionToken};
