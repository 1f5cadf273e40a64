use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::page::{Attachment, ContentBlock};

/// 投稿済みメッセージ1件分の生データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    /// 本文テキスト。マージ時に先頭ブロックへ追記される。
    pub content: String,
    pub blocks: Vec<ContentBlock>,
    pub attachments: Vec<Attachment>,
}

/// チャンネル履歴の取得元。
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// 直近 `count` 件を古い順で返す。
    async fn fetch_recent(&self, channel_id: u64, count: usize) -> Result<Vec<RawMessage>>;
}
