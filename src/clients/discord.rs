/// Discord REST API クライアント。
///
/// チャンネル履歴の取得（`before` によるページング）と、ページの投稿を行います。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    nav::{
        page::{Attachment, ContentBlock, Page},
        source::{HistorySource, RawMessage},
    },
    scheduler::publish::PagePublisher,
    util::retry::{RetryConfig, with_retry},
};

/// 1リクエストで取得できるメッセージ数の上限。
const MAX_PAGE_SIZE: usize = 100;
const RICH_EMBED: &str = "rich";

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub base_url: String,
    pub token: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: Client,
    base_url: Url,
    retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordMessage {
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    embeds: Vec<DiscordEmbed>,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DiscordEmbed {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscordAttachment {
    filename: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordClient {
    /// # Errors
    /// URLのパース、トークンのヘッダー化、またはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: DiscordConfig, retry: RetryConfig) -> Result<Self> {
        let mut auth = header::HeaderValue::from_str(&format!("Bot {}", config.token))
            .context("discord token is not a valid header value")?;
        auth.set_sensitive(true);
        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build discord HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid discord base URL")?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    fn channel_messages_url(&self, channel_id: u64) -> Result<Url> {
        self.base_url
            .join(&format!("channels/{channel_id}/messages"))
            .context("failed to build channel messages URL")
    }

    /// 新しい順に最大 `limit` 件を取得する。
    async fn fetch_page(
        &self,
        channel_id: u64,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<DiscordMessage>> {
        let mut url = self.channel_messages_url(channel_id)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", before);
            }
        }

        with_retry(self.retry, "discord.fetch_messages", || {
            let request = self.client.get(url.clone());
            async move {
                request
                    .send()
                    .await
                    .context("discord messages request failed")?
                    .error_for_status()
                    .context("discord returned error status for messages")?
                    .json::<Vec<DiscordMessage>>()
                    .await
                    .context("failed to deserialize discord messages")
            }
        })
        .await
    }

    /// ページをメッセージとして投稿する。
    ///
    /// # Errors
    /// リクエストが失敗した場合、またはDiscordがエラー状態を返した場合はエラーを返します。
    pub async fn post_page(&self, channel_id: u64, page: &Page) -> Result<()> {
        let url = self.channel_messages_url(channel_id)?;
        let body = CreateMessage::from_page(page);

        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("discord create message request failed")?
            .error_for_status()
            .context("discord returned error status for create message")?;

        Ok(())
    }
}

#[async_trait]
impl HistorySource for DiscordClient {
    async fn fetch_recent(&self, channel_id: u64, count: usize) -> Result<Vec<RawMessage>> {
        let mut collected: Vec<DiscordMessage> = Vec::with_capacity(count);
        let mut before: Option<String> = None;

        while collected.len() < count {
            let limit = (count - collected.len()).min(MAX_PAGE_SIZE);
            let page = self.fetch_page(channel_id, limit, before.as_deref()).await?;
            let fetched = page.len();

            debug!(channel_id, fetched, total = collected.len() + fetched, "fetched discord messages page");

            before = page.last().map(|message| message.id.clone());
            collected.extend(page);

            if fetched < limit {
                break;
            }
        }

        collected.truncate(count);
        // Discord は新しい順で返すため、古い順に並べ替える
        collected.reverse();
        Ok(collected.into_iter().map(RawMessage::from).collect())
    }
}

#[async_trait]
impl PagePublisher for DiscordClient {
    async fn publish(&self, destination: u64, page: &Page) -> Result<()> {
        self.post_page(destination, page)
            .await
            .with_context(|| format!("publish to channel {destination}"))
    }
}

impl From<DiscordMessage> for RawMessage {
    fn from(message: DiscordMessage) -> Self {
        let blocks: Vec<ContentBlock> = message
            .embeds
            .into_iter()
            .map(|embed| ContentBlock {
                autogenerated: embed.kind.as_deref().is_some_and(|kind| kind != RICH_EMBED),
                title: embed.title,
                body: embed.description,
                url: embed.url,
                image_url: embed.image.map(|image| image.url),
                color: embed.color,
            })
            .collect();

        let title = blocks
            .iter()
            .filter(|block| !block.autogenerated)
            .find_map(|block| block.title.clone())
            .unwrap_or_default();

        Self {
            id: message.id,
            timestamp: message.timestamp,
            title,
            content: message.content,
            blocks,
            attachments: message
                .attachments
                .into_iter()
                .map(|attachment| Attachment {
                    filename: attachment.filename,
                    url: attachment.url,
                })
                .collect(),
        }
    }
}

impl CreateMessage {
    fn from_page(page: &Page) -> Self {
        let embeds = page
            .blocks
            .iter()
            .map(|block| DiscordEmbed {
                kind: Some(RICH_EMBED.to_string()),
                title: block.title.clone(),
                description: block.body.clone(),
                url: block.url.clone(),
                color: block.color,
                image: block.image_url.clone().map(|url| EmbedImage { url }),
            })
            .collect();

        // 添付ファイルは再アップロードせず URL を本文に載せる
        let content = (!page.attachments.is_empty()).then(|| {
            page.attachments
                .iter()
                .map(|attachment| attachment.url.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        });

        Self { content, embeds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> DiscordClient {
        DiscordClient::new(
            DiscordConfig {
                base_url: format!("{base_url}/api/v10/"),
                token: "secret".to_string(),
                connect_timeout: Duration::from_secs(3),
                total_timeout: Duration::from_secs(10),
            },
            RetryConfig::new(3, 1, 5),
        )
        .expect("client should build")
    }

    fn message_json(id: u64, day: u32) -> serde_json::Value {
        serde_json::json!({
            "id": id.to_string(),
            "timestamp": format!("2023-08-{day:02}T17:00:05.123000+00:00"),
            "content": "",
            "embeds": [
                {"type": "rich", "title": format!("Sector {day}"), "description": "body", "color": 15483557},
                {"type": "article", "title": "Preview", "url": "https://example.com"}
            ],
            "attachments": []
        })
    }

    #[tokio::test]
    async fn fetch_recent_paginates_and_orders_oldest_first() {
        let server = MockServer::start().await;

        let newest: Vec<_> = (0..100).map(|i| message_json(1000 - i, 10)).collect();
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/42/messages"))
            .and(query_param("limit", "100"))
            .and(header("authorization", "Bot secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Array(newest)))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v10/channels/42/messages"))
            .and(query_param("before", "901"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json(900, 9),
                message_json(899, 8)
            ])))
            .mount(&server)
            .await;

        let messages = client(&server.uri())
            .fetch_recent(42, 120)
            .await
            .expect("fetch should succeed");

        assert_eq!(messages.len(), 102);
        assert_eq!(messages[0].id, "899");
        assert_eq!(messages[101].id, "1000");
        assert!(messages.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test]
    async fn converts_embeds_and_flags_previews() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/7/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json(5, 20)
            ])))
            .mount(&server)
            .await;

        let messages = client(&server.uri()).fetch_recent(7, 5).await.expect("fetch");

        let message = &messages[0];
        assert_eq!(message.title, "Sector 20");
        assert_eq!(message.blocks.len(), 2);
        assert!(!message.blocks[0].autogenerated);
        assert!(message.blocks[1].autogenerated);
        assert_eq!(message.blocks[0].color, Some(15_483_557));
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/7/messages"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/7/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let messages = client(&server.uri()).fetch_recent(7, 5).await.expect("retry succeeds");

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/channels/7/messages"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server.uri()).fetch_recent(7, 5).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn post_page_sends_rich_embeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v10/channels/9/messages"))
            .and(body_partial_json(serde_json::json!({
                "embeds": [{"type": "rich", "title": "Bunker E15", "color": 15483557}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let page = Page {
            title: "Lost Sector for July 21st".to_string(),
            blocks: vec![ContentBlock {
                title: Some("Bunker E15".to_string()),
                color: Some(0x00EC_42A5),
                ..ContentBlock::default()
            }],
            attachments: Vec::new(),
        };

        client(&server.uri())
            .publish(9, &page)
            .await
            .expect("publish should succeed");
    }
}
