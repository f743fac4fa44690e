//! Application services and ports.

#![forbid(unsafe_code)]

mod election_ports;
mod leader_election_service;
mod lock_handle;
mod workload_activation;

pub use election_ports::{
    Clock, ElectionEventRecorder, LeadershipCallbacks, LeadershipTerm, LockRecordStore,
    WorkloadEngine,
};
pub use leader_election_service::{
    DEFAULT_STORE_TIMEOUT, ElectionStatus, LeaderElectionConfig, LeaderElector,
};
pub use lock_handle::LockHandle;
pub use workload_activation::{DEFAULT_WORKLOAD_SHUTDOWN_GRACE, WorkloadActivation};
