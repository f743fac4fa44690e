use async_trait::async_trait;
use tenure_core::AppResult;
use tokio_util::sync::CancellationToken;

/// Side-effecting engine that may only run on the leader.
#[async_trait]
pub trait WorkloadEngine: Send + Sync {
    /// Runs the engine with `parallelism` workers until `stop` is cancelled.
    ///
    /// Called once per leadership term. Must return promptly after `stop`
    /// fires.
    async fn start(&self, parallelism: usize, stop: CancellationToken) -> AppResult<()>;
}
