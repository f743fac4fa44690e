//! Election event recorder that writes events to tracing output.

use async_trait::async_trait;
use tenure_application::ElectionEventRecorder;
use tenure_core::AppResult;
use tenure_domain::{ElectionEvent, ElectionEventKind, StopReason};
use tracing::{error, info};

/// Event recorder that logs each leadership event as a structured line.
#[derive(Clone, Default)]
pub struct TracingElectionEventRecorder;

impl TracingElectionEventRecorder {
    /// Creates a new tracing event recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ElectionEventRecorder for TracingElectionEventRecorder {
    async fn record_event(&self, event: ElectionEvent) -> AppResult<()> {
        let message = event.message();
        match &event.kind {
            ElectionEventKind::StoppedLeading {
                reason: StopReason::RenewDeadlineExceeded,
            } => error!(
                lock = %event.lock,
                identity = %event.identity,
                observed_at = %event.observed_at,
                event = "stopped_leading",
                "{message}"
            ),
            ElectionEventKind::StoppedLeading { .. } => info!(
                lock = %event.lock,
                identity = %event.identity,
                observed_at = %event.observed_at,
                event = "stopped_leading",
                "{message}"
            ),
            ElectionEventKind::StartedLeading => info!(
                lock = %event.lock,
                identity = %event.identity,
                observed_at = %event.observed_at,
                event = "started_leading",
                "{message}"
            ),
            ElectionEventKind::NewLeaderObserved { holder_identity } => info!(
                lock = %event.lock,
                identity = %event.identity,
                holder_identity = %holder_identity,
                observed_at = %event.observed_at,
                event = "new_leader_observed",
                "{message}"
            ),
        }

        Ok(())
    }
}
