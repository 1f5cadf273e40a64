use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_TITLE: &str = "No data available";
pub const PLACEHOLDER_BODY: &str =
    "There is no data for this date yet. Check back closer to the day.";

/// 1日分の表示用コンテンツ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
    pub attachments: Vec<Attachment>,
}

/// リッチコンテンツブロック（Discord の embed 相当）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// プラットフォームが自動生成したリンクプレビュー。
    #[serde(default, skip_serializing)]
    pub autogenerated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

impl Page {
    /// データ未確定の日付に表示する固定ページ。
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            blocks: vec![ContentBlock {
                title: Some(PLACEHOLDER_TITLE.to_string()),
                body: Some(PLACEHOLDER_BODY.to_string()),
                ..ContentBlock::default()
            }],
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }
}

impl ContentBlock {
    /// タイトル・本文・画像のいずれも持たないブロック。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
        blank(&self.title) && blank(&self.body) && blank(&self.image_url)
    }
}
