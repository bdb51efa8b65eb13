use async_trait::async_trait;

use crate::executor::input::DispatchError;

/// Supplies the raw view hierarchy dump of the device's current screen.
///
/// Implementations own connection handling and retries; the caller only
/// expects a complete, well-formed markup document back.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    async fn dump_hierarchy(&self) -> Result<String, DispatchError>;
}
