use crate::domain::model::{ExitInfo, ProcessSpec};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// A supervised long-running service process.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    fn pid(&self) -> u32;

    /// Watch channel that flips from None to Some once the process exits.
    fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>>;

    fn exit_status(&self) -> Option<ExitInfo> {
        *self.exit_watch().borrow()
    }

    fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Graceful stop: SIGTERM, wait up to `grace`, then SIGKILL.
    async fn terminate(&self, grace: Duration) -> Result<ExitInfo>;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a process to completion (init commands, command probes).
    async fn run_once(&self, spec: &ProcessSpec) -> Result<ExitInfo>;

    /// Start a service process and hand back a handle for supervision.
    async fn spawn_service(&self, spec: &ProcessSpec) -> Result<Box<dyn ServiceHandle>>;
}
