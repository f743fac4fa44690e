use async_trait::async_trait;
use tenure_core::AppResult;
use tenure_domain::ElectionEvent;

/// Sink for leadership events.
#[async_trait]
pub trait ElectionEventRecorder: Send + Sync {
    /// Records one event.
    async fn record_event(&self, event: ElectionEvent) -> AppResult<()>;
}
