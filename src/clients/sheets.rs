/// Google Sheets をローテーション表の取得元とするオラクル。
///
/// 表全体を TTL 付きでキャッシュし、更新に失敗した場合は古い表で応答を続けます。
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    sector::rotation::{OracleError, RotationOracle, RotationTable, Sector},
    util::retry::{RetryConfig, with_retry},
};

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: String,
    pub range: String,
    pub api_key: Option<String>,
    pub cache_ttl: Duration,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug)]
struct CachedTable {
    table: Arc<RotationTable>,
    fetched_at: Instant,
}

pub struct SheetRotationOracle {
    client: Client,
    values_url: Url,
    ttl: Duration,
    retry: RetryConfig,
    state: RwLock<Option<CachedTable>>,
    refresh_mutex: Mutex<()>,
}

impl SheetRotationOracle {
    /// # Errors
    /// URLの組み立て、またはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: SheetsConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build sheets HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid sheets base URL")?;
        let mut values_url = base_url
            .join(&format!("{}/values/", config.spreadsheet_id))
            .context("failed to build sheets values URL")?;
        values_url
            .path_segments_mut()
            .map_err(|()| anyhow!("sheets base URL cannot be a base"))?
            .pop_if_empty()
            .push(&config.range);
        if let Some(key) = config.api_key.as_deref() {
            values_url.query_pairs_mut().append_pair("key", key);
        }

        Ok(Self {
            client,
            values_url,
            ttl: config.cache_ttl,
            retry,
            state: RwLock::new(None),
            refresh_mutex: Mutex::new(()),
        })
    }

    /// 鮮度内のキャッシュ、または再取得した表を返す。
    ///
    /// # Errors
    /// 再取得に失敗し、かつ古い表も無い場合はエラーを返します。
    pub async fn table(&self) -> Result<Arc<RotationTable>> {
        if let Some(table) = self.fresh_table().await {
            return Ok(table);
        }

        let _guard = self.refresh_mutex.lock().await;

        // 待っている間に別タスクが更新した可能性がある
        if let Some(table) = self.fresh_table().await {
            return Ok(table);
        }

        match self.fetch_table().await {
            Ok(table) => {
                let table = Arc::new(table);
                info!(rows = table.len(), "rotation table refreshed");
                *self.state.write().await = Some(CachedTable {
                    table: Arc::clone(&table),
                    fetched_at: Instant::now(),
                });
                Ok(table)
            }
            Err(error) => {
                let stale = self
                    .state
                    .read()
                    .await
                    .as_ref()
                    .map(|cached| Arc::clone(&cached.table));
                match stale {
                    Some(table) => {
                        warn!(error = %error, "rotation table refresh failed; serving stale table");
                        Ok(table)
                    }
                    None => Err(error),
                }
            }
        }
    }

    async fn fresh_table(&self) -> Option<Arc<RotationTable>> {
        let state = self.state.read().await;
        state
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.table))
    }

    async fn fetch_table(&self) -> Result<RotationTable> {
        debug!(url = %self.values_url.path(), "fetching rotation sheet");

        let range = with_retry(self.retry, "sheets.fetch_values", || {
            let request = self.client.get(self.values_url.clone());
            async move {
                request
                    .send()
                    .await
                    .context("sheets values request failed")?
                    .error_for_status()
                    .context("sheets returned error status")?
                    .json::<ValueRange>()
                    .await
                    .context("failed to deserialize sheets values")
            }
        })
        .await?;

        Ok(RotationTable::from_sheet_rows(&range.values))
    }
}

#[async_trait]
impl RotationOracle for SheetRotationOracle {
    async fn lookup(&self, date: NaiveDate) -> Result<Option<Sector>, OracleError> {
        let table = self.table().await.map_err(OracleError::Unavailable)?;
        Ok(table.get(date).cloned())
    }
}
