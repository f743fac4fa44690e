mod callbacks;
mod clock;
mod events;
mod store;
mod workload;

pub use callbacks::{LeadershipCallbacks, LeadershipTerm};
pub use clock::Clock;
pub use events::ElectionEventRecorder;
pub use store::LockRecordStore;
pub use workload::WorkloadEngine;
