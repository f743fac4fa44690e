//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_lock_record_store;
mod postgres_lock_record_store;
mod redis_lock_record_store;
mod system_clock;
mod tracing_election_event_recorder;

pub use in_memory_lock_record_store::InMemoryLockRecordStore;
pub use postgres_lock_record_store::PostgresLockRecordStore;
pub use redis_lock_record_store::RedisLockRecordStore;
pub use system_clock::SystemClock;
pub use tracing_election_event_recorder::TracingElectionEventRecorder;
