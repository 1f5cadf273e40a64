use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, redirect};

use crate::sector::format::ImageResolver;

/// 最大リダイレクト回数。
const MAX_REDIRECTS: usize = 10;

/// 画像の共有リンクを辿って最終的なURLを返す。
#[derive(Debug, Clone)]
pub struct HttpImageResolver {
    client: Client,
}

impl HttpImageResolver {
    /// # Errors
    /// HTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(connect_timeout: Duration, total_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .build()
            .context("failed to build image resolver HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageResolver for HttpImageResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("image request failed for {url}"))?
            .error_for_status()
            .context("image host returned error status")?;

        Ok(response.url().to_string())
    }
}
