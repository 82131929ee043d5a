//! Remote backup store abstraction

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Flat remote collection that holds backup archives
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Names of all resources directly inside the collection
    async fn list(&self) -> Result<Vec<String>>;

    /// Upload `bytes` as resource `name`, replacing any existing resource
    async fn put(&self, name: &str, bytes: Bytes) -> Result<()>;
}
