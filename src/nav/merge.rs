//! 同じ日に属する複数メッセージを1ページへ正規化する。

use thiserror::Error;
use tracing::warn;

use super::{
    page::{ContentBlock, Page},
    source::RawMessage,
};
use crate::util::time::long_date_label;

pub const TODAY_TITLE_MARKER: &str = "Lost Sector Today";
pub const TODAY_TOKEN: &str = "Today";

/// 日付置換（見た目上の補正）の失敗。ページ自体は有効なまま返す。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeFormattingError {
    #[error("no messages to take a date from")]
    NoMessages,
    #[error("merged page has no content blocks to relabel")]
    MissingBlocks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMerger {
    marker: String,
    token: String,
}

impl Default for ContentMerger {
    fn default() -> Self {
        Self::new(TODAY_TITLE_MARKER, TODAY_TOKEN)
    }
}

impl ContentMerger {
    /// `marker` を含むタイトルの `token` を日付表記に置き換えるマージャ。
    #[must_use]
    pub fn new(marker: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            token: token.into(),
        }
    }

    /// メッセージ群をメッセージ順に畳み込み、1ページにする。
    ///
    /// 自動生成のリンクプレビューは捨てる。日付置換に失敗しても、ログを残して置換前のページを返す。
    #[must_use]
    pub fn merge(&self, messages: &[RawMessage]) -> Page {
        let mut page = fold_messages(messages);

        if let Err(error) = self.relabel_date(&mut page, messages) {
            warn!(
                %error,
                title = %page.title,
                messages = messages.len(),
                "date relabel skipped; keeping original title"
            );
        }

        page
    }

    fn relabel_date(
        &self,
        page: &mut Page,
        messages: &[RawMessage],
    ) -> Result<(), MergeFormattingError> {
        let first = messages.first().ok_or(MergeFormattingError::NoMessages)?;

        let title_hit = page.title.contains(&self.marker);
        let block_hit = page
            .blocks
            .first()
            .and_then(|block| block.title.as_deref())
            .is_some_and(|title| title.contains(&self.marker));
        if !title_hit && !block_hit {
            return Ok(());
        }

        let replacement = format!("for {}", long_date_label(first.timestamp));
        let block = page
            .blocks
            .first_mut()
            .ok_or(MergeFormattingError::MissingBlocks)?;

        if let Some(title) = block.title.as_mut().filter(|title| title.contains(&self.marker)) {
            *title = title.replacen(&self.token, &replacement, 1);
        }
        if title_hit {
            page.title = page.title.replacen(&self.token, &replacement, 1);
        }

        Ok(())
    }
}

fn fold_messages(messages: &[RawMessage]) -> Page {
    let mut page = Page::default();

    for message in messages {
        if page.title.trim().is_empty() && !message.title.trim().is_empty() {
            page.title.clone_from(&message.title);
        }

        let mut authored: Vec<ContentBlock> = message
            .blocks
            .iter()
            .filter(|block| !block.autogenerated)
            .cloned()
            .collect();
        fold_content(&mut authored, &message.content);

        page.blocks.extend(authored);
        page.attachments.extend(message.attachments.iter().cloned());
    }

    page
}

/// 本文テキストを先頭ブロックの末尾に追記する。ブロックがなければ本文だけのブロックを作る。
fn fold_content(blocks: &mut Vec<ContentBlock>, content: &str) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }

    match blocks.first_mut() {
        Some(first) => {
            first.body = Some(match first.body.take() {
                Some(body) if !body.trim().is_empty() => format!("{body}\n\n{content}"),
                _ => content.to_string(),
            });
        }
        None => blocks.push(ContentBlock {
            body: Some(content.to_string()),
            ..ContentBlock::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::page::Attachment;
    use chrono::{TimeZone, Utc};

    fn block(title: &str) -> ContentBlock {
        ContentBlock {
            title: Some(title.to_string()),
            body: Some(format!("{title} body")),
            ..ContentBlock::default()
        }
    }

    fn preview() -> ContentBlock {
        ContentBlock {
            title: Some("Link preview".to_string()),
            url: Some("https://example.com".to_string()),
            autogenerated: true,
            ..ContentBlock::default()
        }
    }

    fn message(id: &str, title: &str, blocks: Vec<ContentBlock>) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2023, 7, 20, 17, 0, 5).unwrap(),
            title: title.to_string(),
            content: String::new(),
            blocks,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn drops_autogenerated_previews() {
        let merged = ContentMerger::default().merge(&[message(
            "1",
            "Sector",
            vec![block("Authored"), preview()],
        )]);

        assert_eq!(merged.blocks.len(), 1);
        assert_eq!(merged.blocks[0].title.as_deref(), Some("Authored"));
    }

    #[test]
    fn folds_blocks_in_message_order() {
        let mut second = message("2", "Amendment", vec![block("B"), block("C")]);
        second.attachments.push(Attachment {
            filename: "map.png".to_string(),
            url: "https://cdn.example.com/map.png".to_string(),
        });

        let merged = ContentMerger::default().merge(&[
            message("1", "Original", vec![block("A")]),
            second,
        ]);

        let titles: Vec<_> = merged
            .blocks
            .iter()
            .filter_map(|block| block.title.as_deref())
            .collect();
        assert_eq!(titles, ["A", "B", "C"]);
        assert_eq!(merged.title, "Original");
        assert_eq!(merged.attachments.len(), 1);
    }

    #[test]
    fn first_non_empty_title_wins() {
        let merged = ContentMerger::default().merge(&[
            message("1", "  ", vec![block("A")]),
            message("2", "Second", vec![]),
            message("3", "Third", vec![]),
        ]);

        assert_eq!(merged.title, "Second");
    }

    #[test]
    fn relabels_today_marker_with_ordinal_date() {
        let merged = ContentMerger::default().merge(&[message(
            "1",
            "Lost Sector Today",
            vec![block("Lost Sector Today")],
        )]);

        assert_eq!(merged.title, "Lost Sector for July 20th");
        assert_eq!(
            merged.blocks[0].title.as_deref(),
            Some("Lost Sector for July 20th")
        );
    }

    #[test]
    fn relabel_failure_keeps_original_title() {
        let merged = ContentMerger::default().merge(&[message("1", "Lost Sector Today", vec![])]);

        assert_eq!(merged.title, "Lost Sector Today");
        assert!(merged.blocks.is_empty());
    }

    #[test]
    fn relabel_reports_missing_blocks() {
        let merger = ContentMerger::default();
        let messages = [message("1", "Lost Sector Today", vec![])];
        let mut page = fold_messages(&messages);

        assert_eq!(
            merger.relabel_date(&mut page, &messages),
            Err(MergeFormattingError::MissingBlocks)
        );
        assert_eq!(
            merger.relabel_date(&mut Page::default(), &[]),
            Err(MergeFormattingError::NoMessages)
        );
    }

    #[test]
    fn message_content_is_appended_to_first_block() {
        let mut first = message("1", "Sector", vec![block("A"), block("B")]);
        first.content = "Posted by the team".to_string();
        let mut bare = message("2", "", vec![preview()]);
        bare.content = "See you tomorrow".to_string();

        let merged = ContentMerger::default().merge(&[first, bare]);

        assert_eq!(merged.blocks.len(), 3);
        assert_eq!(
            merged.blocks[0].body.as_deref(),
            Some("A body\n\nPosted by the team")
        );
        assert_eq!(merged.blocks[2].body.as_deref(), Some("See you tomorrow"));
    }

    #[test]
    fn merge_is_deterministic() {
        let messages = [
            message("1", "Lost Sector Today", vec![block("Lost Sector Today")]),
            message("2", "", vec![block("Extra"), preview()]),
        ];
        let merger = ContentMerger::default();

        assert_eq!(merger.merge(&messages), merger.merge(&messages));
    }
}
