use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::{glyph::GlyphLookup, rotation::Sector};
use crate::{
    nav::page::{ContentBlock, Page},
    util::time::long_date_label,
};

pub const DEFAULT_EMBED_COLOR: u32 = 0x00EC_42A5;

/// 画像URLのリダイレクトを辿り、直接取得できるURLにする。
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// ローテーション項目をページに整形する。
///
/// 画像URLは整形時に一度だけ解決し、キャッシュされたページはリダイレクト先の変化に影響されない。
#[derive(Clone)]
pub struct PageFormatter {
    glyphs: Arc<dyn GlyphLookup>,
    images: Arc<dyn ImageResolver>,
    color: u32,
}

impl PageFormatter {
    #[must_use]
    pub fn new(glyphs: Arc<dyn GlyphLookup>, images: Arc<dyn ImageResolver>, color: u32) -> Self {
        Self {
            glyphs,
            images,
            color,
        }
    }

    /// `sector` が `None`（未確定）ならプレースホルダーページを返す。失敗しない。
    pub async fn format(&self, sector: Option<&Sector>, date: DateTime<Utc>) -> Page {
        let Some(sector) = sector else {
            return Page::placeholder();
        };

        let image_url = match sector.image_url.as_deref() {
            Some(url) => Some(self.resolve_image(url).await),
            None => None,
        };

        let block = ContentBlock {
            title: Some(sector.name.clone()),
            body: Some(self.render_body(sector)).filter(|body| !body.is_empty()),
            url: sector.shortlink.clone(),
            image_url,
            color: Some(self.color),
            autogenerated: false,
        };

        Page {
            title: format!("Lost Sector for {}", long_date_label(date)),
            blocks: vec![block],
            attachments: Vec::new(),
        }
    }

    async fn resolve_image(&self, url: &str) -> String {
        match self.images.resolve(url).await {
            Ok(resolved) => resolved,
            Err(error) => {
                warn!(url, error = %error, "image resolution failed; keeping original url");
                url.to_string()
            }
        }
    }

    fn render_body(&self, sector: &Sector) -> String {
        let mut lines = Vec::new();

        if let Some(location) = &sector.location {
            lines.push(format!("**Location:** {location}"));
        }
        if let Some(reward) = &sector.reward {
            lines.push(format!("**Reward (if solo):** {reward}"));
        }
        if !sector.champions.is_empty() {
            lines.push(format!("**Champions:** {}", self.decorated(&sector.champions)));
        }
        if !sector.shields.is_empty() {
            lines.push(format!("**Shields:** {}", self.decorated(&sector.shields)));
        }
        if let Some(burn) = &sector.burn {
            lines.push(format!(
                "**Burn:** {}",
                self.decorated(std::slice::from_ref(burn))
            ));
        }
        if !sector.modifiers.is_empty() {
            lines.push(format!("**Modifiers:** {}", sector.modifiers.join(", ")));
        }

        lines.join("\n")
    }

    fn decorated(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|name| match self.glyphs.resolve(name) {
                Some(glyph) => format!("{glyph} {name}"),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::glyph::StaticGlyphs;
    use chrono::TimeZone;
    use std::collections::HashMap;

    struct FixedResolver(Option<&'static str>);

    #[async_trait]
    impl ImageResolver for FixedResolver {
        async fn resolve(&self, _url: &str) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("redirect loop"))
        }
    }

    fn formatter(resolved: Option<&'static str>) -> PageFormatter {
        let glyphs = StaticGlyphs::new(HashMap::from([
            ("barrier".to_string(), "<:barrier:1>".to_string()),
            ("solar".to_string(), "<:solar:2>".to_string()),
        ]));
        PageFormatter::new(
            Arc::new(glyphs),
            Arc::new(FixedResolver(resolved)),
            DEFAULT_EMBED_COLOR,
        )
    }

    fn sector() -> Sector {
        Sector {
            name: "Bunker E15".to_string(),
            location: Some("Europa".to_string()),
            shortlink: Some("https://lost.example/e15".to_string()),
            reward: Some("Exotic Legs".to_string()),
            champions: vec!["Barrier".to_string(), "Overload".to_string()],
            shields: vec!["Solar".to_string()],
            burn: Some("Arc".to_string()),
            modifiers: vec!["Epitaph".to_string()],
            image_url: Some("https://short.example/img".to_string()),
        }
    }

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 21, 17, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn absent_item_formats_as_placeholder() {
        let page = formatter(None).format(None, date()).await;
        assert!(page.is_placeholder());
    }

    #[tokio::test]
    async fn renders_sector_with_glyphs_and_resolved_image() {
        let page = formatter(Some("https://cdn.example/e15.jpg"))
            .format(Some(&sector()), date())
            .await;

        assert_eq!(page.title, "Lost Sector for July 21st");
        assert_eq!(page.blocks.len(), 1);
        let block = &page.blocks[0];
        assert_eq!(block.title.as_deref(), Some("Bunker E15"));
        assert_eq!(block.image_url.as_deref(), Some("https://cdn.example/e15.jpg"));
        assert_eq!(block.color, Some(DEFAULT_EMBED_COLOR));
        let body = block.body.as_deref().unwrap();
        assert!(body.contains("**Champions:** <:barrier:1> Barrier, Overload"));
        assert!(body.contains("**Shields:** <:solar:2> Solar"));
        assert!(body.contains("**Burn:** Arc"));
    }

    #[tokio::test]
    async fn image_resolution_failure_keeps_original_url() {
        let page = formatter(None).format(Some(&sector()), date()).await;

        assert_eq!(
            page.blocks[0].image_url.as_deref(),
            Some("https://short.example/img")
        );
    }
}
