//! Graceful termination of the node's worker tasks.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::consensus::SHUTDOWN_TIMEOUT_SECS;

/// Owns the keep-running token and the handles of every spawned worker.
pub struct ShutdownManager {
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Build around an existing token so external code can trigger the same
    /// shutdown the signal handler does.
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            task_handles: Vec::new(),
        }
    }

    /// Get a clone of the cancellation token for spawning tasks.
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Register a task handle for shutdown coordination.
    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Begin stopping: unblock every worker at its next poll.
    pub fn start_shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for ctrl+c or an internal shutdown trigger, then stop all tasks.
    pub async fn wait_for_shutdown(mut self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("failed to listen for shutdown signal: {e}");
                }
                tracing::info!("shutdown signal received");
            }
            _ = self.cancel_token.cancelled() => {
                tracing::info!("internal shutdown requested");
            }
        }

        self.cancel_token.cancel();

        let timeout = tokio::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        let drain = std::pin::pin!(async {
            for handle in self.task_handles.drain(..) {
                let _ = handle.await;
            }
        });

        match tokio::time::timeout(timeout, drain).await {
            Ok(_) => tracing::info!("all tasks shut down gracefully"),
            Err(_) => tracing::warn!("shutdown timeout: some tasks did not complete"),
        }
    }

    /// Stop all tasks without waiting on a signal; used by tests and by
    /// embedders driving the node programmatically.
    pub async fn shutdown_now(mut self) {
        self.cancel_token.cancel();
        for handle in self.task_handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
