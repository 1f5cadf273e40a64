use anyhow::Result;
use async_trait::async_trait;

use crate::nav::page::Page;

/// ページの配信先。
#[async_trait]
pub trait PagePublisher: Send + Sync {
    async fn publish(&self, destination: u64, page: &Page) -> Result<()>;
}
