//! Device input boundary.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type collaborators report; surfaced to callers as-is.
pub type DispatchError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a command run on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Performs taps on the device. Coordinates are device pixels, the same
/// space as the bounds in a hierarchy dump.
#[async_trait]
pub trait InputDispatcher: Send + Sync {
    async fn dispatch_tap(&self, x: f64, y: f64) -> Result<ExecResult, DispatchError>;
}
