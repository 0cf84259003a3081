use std::fmt::Debug;
use async_trait::async_trait;
use crate::kernel::error::Result;

/// Lifecycle of a store owner (application, project or module scope).
///
/// `initialize` runs when the owner is created, `start` once every component
/// has been registered, and `stop` on owner teardown: it performs the final
/// save and releases storages.
#[async_trait]
pub trait KernelComponent: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
